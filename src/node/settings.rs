//! Node-wide settings stored in `media_node.ini`: display name, generated
//! hostname and the default audio sink with its volume.

use std::path::PathBuf;
use std::sync::Arc;

use log::info;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::command::CommandRunner;
use super::{NodeResult, run_checked};
use crate::core::{
    ConfigStore, DEFAULT_SECTION, Document, Field, Schema, SchemaError, Section, StoreResult,
    ValidationMode,
};

pub const NODE_NAME: &str = "nodeName";
pub const HOSTNAME: &str = "generatedHostname";
pub const AUDIO_DEVICE: &str = "audioDevice";
pub const VOLUME: &str = "volume";

pub const DEFAULT_NODE_NAME: &str = "Media Node";
pub const MAX_NODE_NAME_LEN: usize = 40;

fn generate_hostname() -> String {
    format!("node-{}", Uuid::new_v4().simple())
}

/// Recognized keys of the node settings file. Every call draws a new
/// default hostname.
pub fn node_schema() -> Schema {
    Schema::builder()
        .field(
            Field::text(NODE_NAME)
                .max_len(MAX_NODE_NAME_LEN)
                .trim()
                .default(DEFAULT_NODE_NAME)
                .empty_as_default(),
        )
        .field(Field::text(HOSTNAME).default(generate_hostname()))
        .field(Field::text(AUDIO_DEVICE).default(""))
        .field(Field::int(VOLUME, 0, 150).default(50))
        .build()
}

pub struct NodeSettings {
    store: ConfigStore,
    schema: Schema,
    runner: Arc<dyn CommandRunner>,
}

impl NodeSettings {
    /// Open (and on first start initialize) the settings file at `path`.
    pub fn open(path: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> StoreResult<Self> {
        let schema = node_schema();
        let mut initial = Document::new();
        initial.insert(DEFAULT_SECTION.to_string(), schema.defaults());
        let store = ConfigStore::open(path, Some(&initial))?;

        // Files written by hand or by older versions may lack a hostname
        if !store.load_section(DEFAULT_SECTION)?.contains_key(HOSTNAME) {
            let hostname = generate_hostname();
            let mut data = Section::new();
            data.insert(HOSTNAME.to_string(), hostname.clone());
            store.save_section(&data, DEFAULT_SECTION, false)?;
            info!("Stored generated hostname {}", hostname);
        }

        Ok(Self {
            store,
            schema,
            runner,
        })
    }

    /// Schema defaults overlaid with the stored values
    fn effective(&self) -> StoreResult<Section> {
        let mut section = self.schema.defaults();
        section.extend(self.store.load_section(DEFAULT_SECTION)?);
        Ok(section)
    }

    pub fn settings(&self) -> StoreResult<Map<String, Value>> {
        Ok(self.schema.render(&self.effective()?))
    }

    pub fn node_name(&self) -> StoreResult<String> {
        Ok(self
            .effective()?
            .shift_remove(NODE_NAME)
            .unwrap_or_else(|| DEFAULT_NODE_NAME.to_string()))
    }

    /// Store a new node name (trimmed, empty resets to the default).
    pub fn set_node_name(&self, name: &str) -> NodeResult<String> {
        let data = self
            .schema
            .validate(&json!({ NODE_NAME: name }), ValidationMode::Patch)?;
        self.store.save_section(&data, DEFAULT_SECTION, false)?;
        info!("Node name set to '{}'", data[NODE_NAME]);
        Ok(data[NODE_NAME].clone())
    }

    pub fn regenerate_hostname(&self) -> StoreResult<String> {
        let hostname = generate_hostname();
        let mut data = Section::new();
        data.insert(HOSTNAME.to_string(), hostname.clone());
        self.store.save_section(&data, DEFAULT_SECTION, false)?;
        info!("Generated hostname {}", hostname);
        Ok(hostname)
    }

    /// Make `device` the default sink; persisted only if the command succeeds.
    pub fn set_audio_device(&self, device: &str) -> NodeResult<()> {
        let device = non_empty_device(device)?;
        let args = ["pacmd", "set-default-sink", device].map(String::from);
        run_checked(self.runner.as_ref(), &args)?;

        let mut data = Section::new();
        data.insert(AUDIO_DEVICE.to_string(), device.to_string());
        self.store.save_section(&data, DEFAULT_SECTION, false)?;
        Ok(())
    }

    /// Set the sink volume in percent; persisted only if the command succeeds.
    pub fn set_volume(&self, device: &str, level: &str) -> NodeResult<i64> {
        let device = non_empty_device(device)?;
        let data = self
            .schema
            .validate(&json!({ VOLUME: level }), ValidationMode::Patch)?;
        let percent = format!("{}%", data[VOLUME]);
        let args = ["pactl", "set-sink-volume", device, percent.as_str()].map(String::from);
        run_checked(self.runner.as_ref(), &args)?;

        self.store.save_section(&data, DEFAULT_SECTION, false)?;
        // validate() produced the decimal form
        Ok(data[VOLUME].parse().unwrap_or_default())
    }
}

fn non_empty_device(device: &str) -> Result<&str, SchemaError> {
    let device = device.trim();
    if device.is_empty() {
        return Err(SchemaError::InvalidValue {
            key: AUDIO_DEVICE.to_string(),
            reason: "device name must not be empty".to_string(),
        });
    }
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeError;
    use crate::node::command::testing::ScriptedRunner;
    use tempfile::TempDir;

    fn open(dir: &TempDir, runner: Arc<ScriptedRunner>) -> NodeSettings {
        NodeSettings::open(dir.path().join("media_node.ini"), runner).unwrap()
    }

    #[test]
    fn test_first_open_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = open(&dir, Arc::new(ScriptedRunner::default()));

        let stored = ConfigStore::new(dir.path().join("media_node.ini"))
            .load_section(DEFAULT_SECTION)
            .unwrap();
        assert_eq!(stored[NODE_NAME], DEFAULT_NODE_NAME);
        assert!(stored[HOSTNAME].starts_with("node-"));
        assert_eq!(stored[HOSTNAME].len(), "node-".len() + 32);

        let view = settings.settings().unwrap();
        assert_eq!(view[VOLUME], json!(50));
    }

    #[test]
    fn test_hostname_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let first = open(&dir, Arc::new(ScriptedRunner::default()));
        let hostname = first.settings().unwrap()[HOSTNAME].clone();

        let second = open(&dir, Arc::new(ScriptedRunner::default()));
        assert_eq!(second.settings().unwrap()[HOSTNAME], hostname);

        let fresh = second.regenerate_hostname().unwrap();
        assert_ne!(json!(fresh), hostname);
        assert_eq!(second.settings().unwrap()[HOSTNAME], json!(fresh));
    }

    #[test]
    fn test_missing_hostname_is_stored_on_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("media_node.ini");
        std::fs::write(&path, "[DEFAULT]\nnodeName = Lobby\n").unwrap();

        let first = open(&dir, Arc::new(ScriptedRunner::default()));
        let hostname = first.settings().unwrap()[HOSTNAME].clone();
        let stored = ConfigStore::new(&path).load_section(DEFAULT_SECTION).unwrap();
        assert_eq!(json!(stored[HOSTNAME]), hostname);
        assert_eq!(stored[NODE_NAME], "Lobby");

        let second = open(&dir, Arc::new(ScriptedRunner::default()));
        assert_eq!(second.settings().unwrap()[HOSTNAME], hostname);
    }

    #[test]
    fn test_node_name_is_trimmed_and_bounded() {
        let dir = TempDir::new().unwrap();
        let settings = open(&dir, Arc::new(ScriptedRunner::default()));

        assert_eq!(settings.set_node_name("  Lobby  ").unwrap(), "Lobby");
        assert_eq!(settings.node_name().unwrap(), "Lobby");

        let err = settings.set_node_name(&"x".repeat(41)).unwrap_err();
        assert!(matches!(err, NodeError::Schema(SchemaError::InvalidValue { .. })));
        assert_eq!(settings.node_name().unwrap(), "Lobby");

        assert_eq!(settings.set_node_name("   ").unwrap(), DEFAULT_NODE_NAME);
    }

    #[test]
    fn test_audio_device_persisted_after_command() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let settings = open(&dir, runner.clone());

        settings.set_audio_device("hdmi-sink").unwrap();
        assert_eq!(
            runner.calls(),
            vec![vec!["pacmd", "set-default-sink", "hdmi-sink"]]
        );
        assert_eq!(settings.settings().unwrap()[AUDIO_DEVICE], json!("hdmi-sink"));
    }

    #[test]
    fn test_volume_command_and_range() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let settings = open(&dir, runner.clone());

        assert_eq!(settings.set_volume("sink", "80").unwrap(), 80);
        assert_eq!(
            runner.calls(),
            vec![vec!["pactl", "set-sink-volume", "sink", "80%"]]
        );
        assert_eq!(settings.settings().unwrap()[VOLUME], json!(80));

        let err = settings.set_volume("sink", "151").unwrap_err();
        assert!(matches!(err, NodeError::Schema(_)));
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_failed_command_persists_nothing() {
        let dir = TempDir::new().unwrap();
        let settings = open(&dir, Arc::new(ScriptedRunner::failing()));

        let err = settings.set_volume("sink", "30").unwrap_err();
        assert!(matches!(err, NodeError::Command { .. }));
        assert!(settings.set_audio_device("sink").is_err());

        let view = settings.settings().unwrap();
        assert_eq!(view[VOLUME], json!(50));
        assert_eq!(view[AUDIO_DEVICE], json!(""));
    }

    #[test]
    fn test_empty_device_rejected() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let settings = open(&dir, runner.clone());
        assert!(matches!(
            settings.set_audio_device(" ").unwrap_err(),
            NodeError::Schema(_)
        ));
        assert!(runner.calls().is_empty());
    }
}
