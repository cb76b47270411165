//! Control port allocation for player instances.

use std::collections::BTreeSet;

/// First control port handed out when no player exists
pub const DEFAULT_PORT_FLOOR: u16 = 50000;

/// Smallest port not in `existing`.
///
/// With no existing ports the answer is `floor`. Otherwise the first gap in
/// `[min, max]` is reused, else `max + 1`. `None` only when `max` is already
/// `u16::MAX` and there is no gap.
pub fn next_port(existing: &BTreeSet<u16>, floor: u16) -> Option<u16> {
    let (Some(&min), Some(&max)) = (existing.first(), existing.last()) else {
        return Some(floor);
    };

    // BTreeSet iterates in order: the first port that does not match its
    // expected slot marks the gap.
    let mut expected = min;
    for &port in existing {
        if port != expected {
            return Some(expected);
        }
        expected = expected.checked_add(1)?;
    }
    max.checked_add(1)
}
