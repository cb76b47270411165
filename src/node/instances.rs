//! Player and browser instances: schema validation in front of the
//! [`InstanceRegistry`], typed JSON out.

use std::path::PathBuf;

use serde_json::{Map, Value};

use super::NodeResult;
use crate::core::instances::{PORT_KEY, UUID_KEY};
use crate::core::ports::DEFAULT_PORT_FLOOR;
use crate::core::{
    Field, InstanceKind, InstanceRecord, InstanceRegistry, Schema, StoreResult, ValidationMode,
};

/// libvlc video outputs accepted by the player, `any` lets it choose
pub const VIDEO_OUTPUTS: &[&str] = &[
    "any",
    "direct3d11",
    "direct3d9",
    "glwin32",
    "gl",
    "gles2",
    "directdraw",
    "wingdi",
    "xcb_xv",
    "xcb_x11",
    "mmal_xsplitter",
];

pub const AUDIO_OUTPUTS: &[&str] = &[
    "any",
    "alsa",
    "pulse",
    "mmdevice",
    "directsound",
    "waveout",
    "amem",
    "afile",
    "adummy",
    "none",
];

/// Loop, repeat, random
pub const PLAYBACK_MODES: &[&str] = &["-L", "-R", "-Z"];

pub const BLANK_PAGE: &str = "about:blank";

pub fn player_schema() -> Schema {
    Schema::builder()
        .field(Field::text("name").trim().required())
        .field(Field::boolean("autostart").default(false))
        .field(Field::int("volume", 0, 320).default(0))
        .field(Field::choice("videoOutput", VIDEO_OUTPUTS).default("any"))
        .field(Field::choice("audioOutput", AUDIO_OUTPUTS).default("any"))
        .field(Field::text("audioDevice").default(""))
        .field(Field::words("playback", PLAYBACK_MODES).default("-L"))
        .field(Field::float("imageDuration", 0.0, f64::MAX).default(10))
        .field(Field::int("screenNumber", 0, i64::from(u16::MAX)).required())
        .field(Field::text("playlist").required())
        .build()
}

pub fn browser_schema() -> Schema {
    Schema::builder()
        .field(Field::text("name").trim().required())
        .field(Field::boolean("autostart").default(false))
        .field(Field::text("webPage").trim().default(BLANK_PAGE).empty_as_default())
        .field(Field::int("screenNumber", 0, i64::from(u16::MAX)).default(0))
        .build()
}

pub struct Instances {
    registry: InstanceRegistry,
    schema: Schema,
}

impl Instances {
    pub fn new(registry: InstanceRegistry, schema: Schema) -> Self {
        Self { registry, schema }
    }

    pub fn players(dir: impl Into<PathBuf>) -> Self {
        Self::new(
            InstanceRegistry::new(
                dir,
                InstanceKind::Player {
                    port_floor: DEFAULT_PORT_FLOOR,
                },
            ),
            player_schema(),
        )
    }

    pub fn browsers(dir: impl Into<PathBuf>) -> Self {
        Self::new(InstanceRegistry::new(dir, InstanceKind::Browser), browser_schema())
    }

    pub fn label(&self) -> &'static str {
        self.registry.kind().label()
    }

    pub fn create(&self, input: &Value) -> NodeResult<Value> {
        let settings = self.schema.validate(input, ValidationMode::Create)?;
        let record = self.registry.create(&settings)?;
        Ok(self.render(&record))
    }

    pub fn get(&self, id: &str) -> StoreResult<Value> {
        Ok(self.render(&self.registry.get(id)?))
    }

    /// Partial update of the keys present in `input`
    pub fn update(&self, id: &str, input: &Value) -> NodeResult<Value> {
        let mut input = input.clone();
        if let Value::Object(map) = &mut input {
            // Echoing back a rendered instance is allowed, ids are not editable
            map.remove(UUID_KEY);
            map.remove(PORT_KEY);
        }
        let partial = self.schema.validate(&input, ValidationMode::Patch)?;
        let record = self.registry.update(id, &partial)?;
        Ok(self.render(&record))
    }

    pub fn delete(&self, id: &str) -> StoreResult<()> {
        self.registry.delete(id)
    }

    pub fn list(&self) -> StoreResult<Vec<Value>> {
        Ok(self
            .registry
            .list()?
            .iter()
            .map(|record| self.render(record))
            .collect())
    }

    fn render(&self, record: &InstanceRecord) -> Value {
        let mut object = Map::new();
        object.insert(UUID_KEY.to_string(), Value::from(record.uuid.clone()));
        if let Some(port) = record.control_port {
            object.insert(PORT_KEY.to_string(), Value::from(port));
        }
        object.extend(self.schema.render(&record.settings));
        Value::Object(object)
    }
}
