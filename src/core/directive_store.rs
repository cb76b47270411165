//! Flat-file store of per-device directives with merge-on-write.
//!
//! One line per device, most recently touched device first. Partial updates
//! merge into the stored line instead of replacing it, and at most one line
//! carries `--primary`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::debug;

use super::directive::{Directive, Flag};
use super::error::{StoreError, StoreResult};
use super::fsio::{read_optional, write_atomic};

pub struct DirectiveStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DirectiveStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Merge `partial` into the stored directive of `device` and move it to
    /// the front. If `partial` sets `--primary`, every other line loses it.
    /// Other lines are written back as read. Returns the directive as persisted.
    pub fn apply(&self, device: &str, partial: &Directive) -> StoreResult<Directive> {
        let incoming = normalize(device, partial);
        let _guard = self.guard();

        let mut lines = self.read_lines()?.unwrap_or_default();
        let merged = match lines.iter().position(|l| l.is_device(device)) {
            Some(idx) => {
                let mut stored = lines.remove(idx).directive;
                stored.merge(&incoming);
                debug!("Merged directive for {}: {}", device, stored);
                stored
            }
            None => {
                debug!("New directive for {}: {}", device, incoming);
                incoming.clone()
            }
        };

        if incoming.is_primary() {
            for other in lines.iter_mut() {
                if other.strip_primary() {
                    debug!("Primary moved from {:?} to {}", other.directive.output(), device);
                }
            }
        }

        lines.insert(0, StoredLine::from_directive(merged.clone()));
        self.write_lines(&lines)?;
        Ok(merged)
    }

    /// Delete the line for `device`.
    pub fn remove(&self, device: &str) -> StoreResult<()> {
        let _guard = self.guard();
        let not_found = || StoreError::NotFound(format!("display config '{}'", device));

        let mut lines = self.read_lines()?.ok_or_else(not_found)?;
        let idx = lines
            .iter()
            .position(|l| l.is_device(device))
            .ok_or_else(not_found)?;
        lines.remove(idx);
        self.write_lines(&lines)
    }

    /// All stored directives, most recent first. Empty if the file is missing.
    pub fn list(&self) -> StoreResult<Vec<Directive>> {
        Ok(self
            .read_lines()?
            .unwrap_or_default()
            .into_iter()
            .map(|l| l.directive)
            .collect())
    }

    /// Stored directive for `device`, if any.
    pub fn get(&self, device: &str) -> StoreResult<Option<Directive>> {
        Ok(self
            .read_lines()?
            .unwrap_or_default()
            .into_iter()
            .find(|l| l.is_device(device))
            .map(|l| l.directive))
    }

    fn read_lines(&self) -> StoreResult<Option<Vec<StoredLine>>> {
        let Some(text) = read_optional(&self.path)? else {
            return Ok(None);
        };
        Ok(Some(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(StoredLine::parse)
                .collect(),
        ))
    }

    fn write_lines(&self, lines: &[StoredLine]) -> StoreResult<()> {
        let mut text = lines
            .iter()
            .map(|l| l.raw.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        write_atomic(&self.path, &text)
    }
}

/// One line of the file: its text as written plus the decoded view.
/// `raw` is only regenerated when the line itself changes, so options the
/// codec cannot represent (`--set audio on`) survive edits to other devices.
#[derive(Debug, Clone)]
struct StoredLine {
    raw: String,
    directive: Directive,
}

impl StoredLine {
    fn parse(line: &str) -> Self {
        Self {
            raw: line.to_string(),
            directive: Directive::decode_line(line),
        }
    }

    fn from_directive(directive: Directive) -> Self {
        Self {
            raw: directive.encode_line(),
            directive,
        }
    }

    fn is_device(&self, device: &str) -> bool {
        self.directive.output() == Some(device)
    }

    /// Drop every `--primary` token from the text. Returns true if the line
    /// was primary.
    fn strip_primary(&mut self) -> bool {
        if !self.directive.clear_primary() {
            return false;
        }
        let primary = Flag::Primary;
        self.raw = self
            .raw
            .split_whitespace()
            .filter(|t| *t != primary.as_token())
            .collect::<Vec<_>>()
            .join(" ");
        true
    }
}

/// Make `--output <device>` the first flag of `partial`.
fn normalize(device: &str, partial: &Directive) -> Directive {
    let mut directive = Directive::for_output(device);
    if !partial.command.is_empty() {
        directive.command = partial.command.clone();
    }
    for (flag, value) in &partial.flags {
        if *flag != Flag::Output {
            directive.set(flag.clone(), value.clone());
        }
    }
    directive
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> DirectiveStore {
        DirectiveStore::new(dir.path().join("xrandr.txt"))
    }

    fn mode(m: &str) -> Directive {
        Directive::default().with(Flag::Mode, Some(m.to_string()))
    }

    #[test]
    fn test_first_apply_creates_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.apply("HDMI-1", &mode("1920x1080")).unwrap();

        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "xrandr --output HDMI-1 --mode 1920x1080\n"
        );
    }

    #[test]
    fn test_new_device_is_prepended() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.apply("HDMI-1", &mode("1920x1080")).unwrap();
        store.apply("DP-1", &mode("1280x1024")).unwrap();

        let outputs: Vec<_> = store
            .list()
            .unwrap()
            .iter()
            .map(|d| d.output().unwrap().to_string())
            .collect();
        assert_eq!(outputs, vec!["DP-1", "HDMI-1"]);
    }

    #[test]
    fn test_merge_preserves_unmentioned_fields() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .apply(
                "HDMI-1",
                &mode("1920x1080").with(Flag::Rotate, Some("left".into())),
            )
            .unwrap();
        store.apply("DP-1", &mode("800x600")).unwrap();

        let partial = Directive::default().with(Flag::Rotate, Some("normal".into()));
        let merged = store.apply("HDMI-1", &partial).unwrap();

        assert_eq!(merged.get(&Flag::Mode), Some("1920x1080"));
        assert_eq!(merged.get(&Flag::Rotate), Some("normal"));
        // touched device moves to the front
        assert_eq!(store.list().unwrap()[0].output(), Some("HDMI-1"));
    }

    #[test]
    fn test_single_primary_invariant() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let primary = |m: &str| mode(m).with(Flag::Primary, None);

        store.apply("displayA", &primary("1920x1080")).unwrap();
        store.apply("displayB", &primary("1280x1024")).unwrap();

        let list = store.list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].output(), Some("displayB"));
        assert!(list[0].is_primary());
        assert_eq!(list[0].get(&Flag::Mode), Some("1280x1024"));
        assert_eq!(list[1].output(), Some("displayA"));
        assert!(!list[1].is_primary());
        assert_eq!(list[1].get(&Flag::Mode), Some("1920x1080"));

        // Non-primary update of A leaves B primary
        store.apply("displayA", &mode("1024x768")).unwrap();
        let primaries: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .filter(|d| d.is_primary())
            .map(|d| d.output().unwrap().to_string())
            .collect();
        assert_eq!(primaries, vec!["displayB"]);
    }

    #[test]
    fn test_device_match_is_exact() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.apply("HDMI-10", &mode("800x600")).unwrap();
        store.apply("HDMI-1", &mode("1920x1080")).unwrap();

        assert_eq!(store.list().unwrap().len(), 2);
        assert_eq!(
            store.get("HDMI-10").unwrap().unwrap().get(&Flag::Mode),
            Some("800x600")
        );
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.remove("HDMI-1").unwrap_err().is_not_found());

        store.apply("HDMI-1", &mode("1920x1080")).unwrap();
        store.apply("DP-1", &mode("800x600")).unwrap();
        assert!(store.remove("VGA-1").unwrap_err().is_not_found());

        store.remove("HDMI-1").unwrap();
        let list = store.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].output(), Some("DP-1"));
    }

    #[test]
    fn test_list_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).list().unwrap().is_empty());
    }

    #[test]
    fn test_hand_edited_lines_survive() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(
            store.path(),
            "sudo xrandr --output VGA-1 --scale 2x2 --primary\n\nxrandr --output DP-1 --mode\n",
        )
        .unwrap();

        store.apply("DP-1", &mode("800x600")).unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "xrandr --output DP-1 --mode 800x600\nsudo xrandr --output VGA-1 --scale 2x2 --primary\n"
        );
    }

    #[test]
    fn test_untouched_lines_are_written_back_verbatim() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(
            store.path(),
            "xrandr --output VGA-1 --set audio on\nxrandr  --output HDMI-1   --auto\n",
        )
        .unwrap();

        store.apply("DP-1", &mode("800x600")).unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "xrandr --output DP-1 --mode 800x600\n\
             xrandr --output VGA-1 --set audio on\n\
             xrandr  --output HDMI-1   --auto\n"
        );
    }

    #[test]
    fn test_primary_strip_keeps_other_options() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "xrandr --output VGA-1 --set audio on --primary\n").unwrap();

        store
            .apply("DP-1", &mode("800x600").with(Flag::Primary, None))
            .unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "xrandr --output DP-1 --mode 800x600 --primary\nxrandr --output VGA-1 --set audio on\n"
        );
        assert!(!store.get("VGA-1").unwrap().unwrap().is_primary());
    }

    #[test]
    fn test_concurrent_applies_keep_every_device() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let devices: Vec<String> = (0..16).map(|i| format!("DP-{}", i)).collect();

        std::thread::scope(|s| {
            for device in &devices {
                let store = &store;
                s.spawn(move || store.apply(device, &mode("800x600")).unwrap());
            }
        });

        let list = store.list().unwrap();
        assert_eq!(list.len(), devices.len());
        for device in &devices {
            assert!(store.get(device).unwrap().is_some(), "{} missing", device);
        }
    }
}
