//! Display configuration on top of the directive store.
//!
//! A request carries a partial [`DisplayConfig`]; only the fields it sets
//! become flags of the `xrandr` directive. The directive is run against the
//! live X server first and merged into `displays.conf` only when that
//! succeeds, so a failed mode switch is never replayed on the next boot.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::command::CommandRunner;
use super::{NodeResult, run_checked};
use crate::core::{Directive, DirectiveStore, Flag, SchemaError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Normal,
    Left,
    Inverted,
    Right,
}

impl Rotation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rotation::Normal => "normal",
            Rotation::Left => "left",
            Rotation::Inverted => "inverted",
            Rotation::Right => "right",
        }
    }
}

impl FromStr for Rotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Rotation::Normal),
            "left" => Ok(Rotation::Left),
            "inverted" => Ok(Rotation::Inverted),
            "right" => Ok(Rotation::Right),
            other => Err(format!("unknown rotation '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reflect {
    Normal,
    X,
    Y,
    Xy,
}

impl Reflect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reflect::Normal => "normal",
            Reflect::X => "x",
            Reflect::Y => "y",
            Reflect::Xy => "xy",
        }
    }
}

impl FromStr for Reflect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Reflect::Normal),
            "x" => Ok(Reflect::X),
            "y" => Ok(Reflect::Y),
            "xy" => Ok(Reflect::Xy),
            other => Err(format!("unknown reflection '{}'", other)),
        }
    }
}

/// Mode size, `WxH` on the wire and in JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Screen offset, `XxY` on the wire and in JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

fn split_pair(s: &str, what: &str) -> Result<(u32, u32), String> {
    let err = || format!("invalid {} '{}', expected AxB", what, s);
    let (a, b) = s.split_once('x').ok_or_else(err)?;
    let a = a.parse().map_err(|_| err())?;
    let b = b.parse().map_err(|_| err())?;
    Ok((a, b))
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = split_pair(s, "resolution")?;
        if width == 0 || height == 0 {
            return Err(format!("invalid resolution '{}'", s));
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl TryFrom<String> for Resolution {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Resolution> for String {
    fn from(r: Resolution) -> Self {
        r.to_string()
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = split_pair(s, "position")?;
        Ok(Self { x, y })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

impl TryFrom<String> for Position {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Position> for String {
    fn from(p: Position) -> Self {
        p.to_string()
    }
}

/// Desired state of one output; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DisplayConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Rotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflect: Option<Reflect>,
    /// `Some(false)` is the same as `None`: primary moves only by being set
    /// on another output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
}

impl DisplayConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), SchemaError> {
        let invalid = |key: &str, reason: &str| SchemaError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if self.name.is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(invalid("name", "must be a non-empty output name without spaces"));
        }
        if self.name.starts_with('-') {
            return Err(invalid("name", "must not start with '-'"));
        }
        if let Some(rate) = self.rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(invalid("rate", "must be a positive number"));
            }
        }
        Ok(())
    }

    /// Partial directive holding only the fields that are set
    pub fn to_directive(&self) -> Directive {
        let mut directive = Directive::for_output(&self.name);
        if let Some(resolution) = self.resolution {
            directive.set(Flag::Mode, Some(resolution.to_string()));
        }
        if let Some(rate) = self.rate {
            directive.set(Flag::Rate, Some(rate.to_string()));
        }
        if let Some(rotation) = self.rotation {
            directive.set(Flag::Rotate, Some(rotation.as_str().to_string()));
        }
        if let Some(position) = self.position {
            directive.set(Flag::Pos, Some(position.to_string()));
        }
        if let Some(reflect) = self.reflect {
            directive.set(Flag::Reflect, Some(reflect.as_str().to_string()));
        }
        if self.primary == Some(true) {
            directive.set(Flag::Primary, None);
        }
        directive
    }

    /// View of a stored directive. Values that do not parse (hand edits)
    /// are reported as unset.
    pub fn from_directive(directive: &Directive) -> Option<Self> {
        let name = directive.output()?;
        Some(Self {
            name: name.to_string(),
            resolution: parse_flag(directive, Flag::Mode),
            rate: parse_flag(directive, Flag::Rate),
            rotation: parse_flag(directive, Flag::Rotate),
            position: parse_flag(directive, Flag::Pos),
            reflect: parse_flag(directive, Flag::Reflect),
            primary: directive.is_primary().then_some(true),
        })
    }
}

fn parse_flag<T: FromStr>(directive: &Directive, flag: Flag) -> Option<T> {
    let raw = directive.get(&flag)?;
    let parsed = raw.parse().ok();
    if parsed.is_none() {
        debug!("Ignoring unparseable {} value '{}'", flag, raw);
    }
    parsed
}

pub struct Displays {
    store: DirectiveStore,
    runner: Arc<dyn CommandRunner>,
    // Held across run and persist so the stored line matches the last run
    lock: Mutex<()>,
}

impl Displays {
    pub fn new(path: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            store: DirectiveStore::new(path),
            runner,
            lock: Mutex::new(()),
        }
    }

    /// Run the partial directive, then merge it into the stored one.
    /// Returns the merged configuration of the output.
    pub fn apply(&self, config: &DisplayConfig) -> NodeResult<DisplayConfig> {
        config.validate()?;
        let partial = config.to_directive();
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        run_checked(self.runner.as_ref(), &partial.encode())?;

        let merged = self.store.apply(&config.name, &partial)?;
        info!("Display {} configured: {}", config.name, merged);
        Ok(DisplayConfig::from_directive(&merged).unwrap_or_else(|| config.clone()))
    }

    /// Stored outputs, most recently configured first
    pub fn list(&self) -> StoreResult<Vec<DisplayConfig>> {
        Ok(self
            .store
            .list()?
            .iter()
            .filter_map(DisplayConfig::from_directive)
            .collect())
    }

    pub fn remove(&self, name: &str) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.store.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeError;
    use crate::node::command::testing::ScriptedRunner;
    use serde_json::json;
    use tempfile::TempDir;

    fn displays(dir: &TempDir, runner: Arc<ScriptedRunner>) -> Displays {
        Displays::new(dir.path().join("displays.conf"), runner)
    }

    #[test]
    fn test_json_shape() {
        let config: DisplayConfig = serde_json::from_value(json!({
            "name": "HDMI-1",
            "resolution": "1920x1080",
            "rotation": "left",
            "position": "1920x0",
            "reflect": "xy",
            "primary": true
        }))
        .unwrap();
        assert_eq!(config.resolution, Some(Resolution { width: 1920, height: 1080 }));
        assert_eq!(config.position, Some(Position { x: 1920, y: 0 }));
        assert_eq!(config.reflect, Some(Reflect::Xy));

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["resolution"], json!("1920x1080"));
        assert!(back.get("rate").is_none());

        assert!(serde_json::from_value::<DisplayConfig>(json!({"name": "a", "resolution": "big"})).is_err());
        assert!(serde_json::from_value::<DisplayConfig>(json!({"name": "a", "colour": 1})).is_err());
    }

    #[test]
    fn test_apply_runs_then_persists() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let service = displays(&dir, runner.clone());

        let config = DisplayConfig {
            resolution: Some(Resolution { width: 1920, height: 1080 }),
            rotation: Some(Rotation::Left),
            ..DisplayConfig::new("HDMI-1")
        };
        service.apply(&config).unwrap();
        assert_eq!(
            runner.calls(),
            vec![vec!["xrandr", "--output", "HDMI-1", "--mode", "1920x1080", "--rotate", "left"]]
        );

        let merged = service
            .apply(&DisplayConfig {
                rotation: Some(Rotation::Normal),
                ..DisplayConfig::new("HDMI-1")
            })
            .unwrap();
        assert_eq!(merged.resolution, Some(Resolution { width: 1920, height: 1080 }));
        assert_eq!(merged.rotation, Some(Rotation::Normal));
        assert_eq!(service.list().unwrap(), vec![merged]);
    }

    #[test]
    fn test_primary_moves_between_outputs() {
        let dir = TempDir::new().unwrap();
        let service = displays(&dir, Arc::new(ScriptedRunner::default()));

        for name in ["HDMI-1", "HDMI-2"] {
            service
                .apply(&DisplayConfig {
                    primary: Some(true),
                    ..DisplayConfig::new(name)
                })
                .unwrap();
        }
        let listed = service.list().unwrap();
        assert_eq!(listed[0].name, "HDMI-2");
        assert_eq!(listed[0].primary, Some(true));
        assert_eq!(listed[1].name, "HDMI-1");
        assert_eq!(listed[1].primary, None);
    }

    #[test]
    fn test_failed_command_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let service = displays(&dir, Arc::new(ScriptedRunner::failing()));

        let err = service
            .apply(&DisplayConfig {
                rate: Some(60.0),
                ..DisplayConfig::new("DP-1")
            })
            .unwrap_err();
        assert!(matches!(err, NodeError::Command { .. }));
        assert!(service.list().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_name_rejected_before_running() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let service = displays(&dir, runner.clone());

        assert!(matches!(
            service.apply(&DisplayConfig::new("HDMI 1")).unwrap_err(),
            NodeError::Schema(_)
        ));
        assert!(service.apply(&DisplayConfig::new("")).is_err());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_unparseable_stored_values_are_unset() {
        let directive = Directive::decode_line("xrandr --output VGA-1 --mode 800x600i --rate 60 --scale 2x2");
        let view = DisplayConfig::from_directive(&directive).unwrap();
        assert_eq!(view.name, "VGA-1");
        assert_eq!(view.resolution, None);
        assert_eq!(view.rate, Some(60.0));
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let service = displays(&dir, Arc::new(ScriptedRunner::default()));
        service.apply(&DisplayConfig::new("HDMI-1")).unwrap();

        service.remove("HDMI-1").unwrap();
        assert!(service.list().unwrap().is_empty());
        assert!(service.remove("HDMI-1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_concurrent_applies_persist_last_run() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let service = displays(&dir, runner.clone());
        let rotations = [Rotation::Normal, Rotation::Left, Rotation::Inverted, Rotation::Right];

        std::thread::scope(|s| {
            for i in 0..16 {
                let service = &service;
                let rotation = rotations[i % rotations.len()];
                s.spawn(move || {
                    service
                        .apply(&DisplayConfig {
                            rotation: Some(rotation),
                            ..DisplayConfig::new("HDMI-1")
                        })
                        .unwrap();
                });
            }
        });

        let calls = runner.calls();
        assert_eq!(calls.len(), 16);
        let last = calls.last().unwrap().last().unwrap().clone();
        let stored = service.list().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rotation.map(|r| r.as_str().to_string()), Some(last));
    }
}
