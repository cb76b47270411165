//! Tokenized display directives (one `xrandr` command line per device).
//!
//! A directive line such as
//!
//! ```text
//! xrandr --output HDMI-1 --mode 1920x1080 --rotate left --primary
//! ```
//!
//! decodes into a command prefix (`xrandr`) plus an ordered flag map
//! `{Output: HDMI-1, Mode: 1920x1080, Rotate: left, Primary: None}`.

use std::fmt;

use indexmap::IndexMap;
use log::warn;

/// Program word used for newly created directives
pub const XRANDR: &str = "xrandr";

/// Recognized directive flags. Anything else survives as [`Flag::Extra`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    Output,
    Mode,
    Rate,
    Rotate,
    Reflect,
    Pos,
    Primary,
    /// Opaque pass-through for flags written by hand (`--scale`, `--auto`...)
    Extra(String),
}

/// Extra flags known to take no argument
const BARE_EXTRA_FLAGS: &[&str] = &["--auto", "--off", "--preferred"];

impl Flag {
    pub fn from_token(token: &str) -> Option<Flag> {
        if !token.starts_with("--") {
            return None;
        }
        Some(match token {
            "--output" => Flag::Output,
            "--mode" => Flag::Mode,
            "--rate" => Flag::Rate,
            "--rotate" | "--rotation" => Flag::Rotate,
            "--reflect" => Flag::Reflect,
            "--pos" => Flag::Pos,
            "--primary" => Flag::Primary,
            other => Flag::Extra(other.to_string()),
        })
    }

    pub fn as_token(&self) -> &str {
        match self {
            Flag::Output => "--output",
            Flag::Mode => "--mode",
            Flag::Rate => "--rate",
            Flag::Rotate => "--rotate",
            Flag::Reflect => "--reflect",
            Flag::Pos => "--pos",
            Flag::Primary => "--primary",
            Flag::Extra(token) => token.as_str(),
        }
    }

    /// False for argument-free flags
    pub fn takes_value(&self) -> bool {
        match self {
            Flag::Primary => false,
            Flag::Extra(token) => !BARE_EXTRA_FLAGS.contains(&token.as_str()),
            _ => true,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// One decoded directive line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Directive {
    /// Leading non-flag words (`xrandr`, `sudo xrandr`)
    pub command: Vec<String>,
    /// Flags in line order; `None` for bare flags
    pub flags: IndexMap<Flag, Option<String>>,
}

impl Directive {
    /// Empty `xrandr --output <device>` directive
    pub fn for_output(device: &str) -> Self {
        let mut flags = IndexMap::new();
        flags.insert(Flag::Output, Some(device.to_string()));
        Self {
            command: vec![XRANDR.to_string()],
            flags,
        }
    }

    /// Builder-style setter
    pub fn with(mut self, flag: Flag, value: Option<String>) -> Self {
        self.set(flag, value);
        self
    }

    pub fn set(&mut self, flag: Flag, value: Option<String>) {
        self.flags.insert(flag, value);
    }

    pub fn get(&self, flag: &Flag) -> Option<&str> {
        self.flags.get(flag).and_then(|v| v.as_deref())
    }

    pub fn has(&self, flag: &Flag) -> bool {
        self.flags.contains_key(flag)
    }

    pub fn output(&self) -> Option<&str> {
        self.get(&Flag::Output)
    }

    pub fn is_primary(&self) -> bool {
        self.has(&Flag::Primary)
    }

    /// Drop the primary flag. Returns true if it was present.
    pub fn clear_primary(&mut self) -> bool {
        self.flags.shift_remove(&Flag::Primary).is_some()
    }

    /// Right-biased merge: flags from `newer` overwrite same-named flags in
    /// place, new flags are appended, flags absent from `newer` survive.
    pub fn merge(&mut self, newer: &Directive) {
        if self.command.is_empty() {
            self.command = newer.command.clone();
        }
        for (flag, value) in &newer.flags {
            self.flags.insert(flag.clone(), value.clone());
        }
    }

    /// Decode a token stream.
    ///
    /// A value-taking flag at the end of the line (no value token left) is
    /// kept as a bare flag and reported with a warning.
    pub fn decode<S: AsRef<str>>(tokens: &[S]) -> Directive {
        let mut directive = Directive::default();
        let mut iter = tokens.iter().map(|t| t.as_ref());

        while let Some(token) = iter.next() {
            let Some(flag) = Flag::from_token(token) else {
                if directive.flags.is_empty() {
                    directive.command.push(token.to_string());
                } else {
                    warn!("Ignoring stray directive word '{}'", token);
                }
                continue;
            };

            if !flag.takes_value() {
                directive.flags.insert(flag, None);
                continue;
            }
            match iter.next() {
                Some(value) => {
                    directive.flags.insert(flag, Some(value.to_string()));
                }
                None => {
                    warn!("Directive flag '{}' has no value, keeping it bare", flag);
                    directive.flags.insert(flag, None);
                }
            }
        }
        directive
    }

    pub fn decode_line(line: &str) -> Directive {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        Self::decode(&tokens)
    }

    /// Inverse of [`decode`](Self::decode)
    pub fn encode(&self) -> Vec<String> {
        let mut tokens = self.command.clone();
        for (flag, value) in &self.flags {
            tokens.push(flag.as_token().to_string());
            if let Some(value) = value {
                tokens.push(value.clone());
            }
        }
        tokens
    }

    pub fn encode_line(&self) -> String {
        self.encode().join(" ")
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode_line())
    }
}
