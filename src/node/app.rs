//! Server settings from `app.ini`.

use std::path::PathBuf;

use log::{debug, warn};
use serde_json::json;

use crate::core::{
    ConfigStore, DEFAULT_SECTION, Document, Field, Schema, Section, StoreResult, ValidationMode,
};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

const HOST: &str = "host";
const PORT: &str = "port";
const DEBUG: &str = "debug";
const CORS: &str = "cors";

pub fn app_schema() -> Schema {
    Schema::builder()
        .field(Field::text(HOST).trim().default(DEFAULT_HOST).empty_as_default())
        .field(Field::int(PORT, 1, u16::MAX as i64).default(DEFAULT_PORT))
        .field(Field::boolean(DEBUG).default(false))
        .field(Field::boolean(CORS).default(true))
        .build()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    /// Send permissive CORS headers
    pub cors: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            debug: false,
            cors: true,
        }
    }
}

impl AppSettings {
    /// Read `app.ini`, writing the defaults on first start. Every stored key
    /// goes through [`app_schema`]; values it rejects fall back to their
    /// default with a warning.
    pub fn load(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let schema = app_schema();
        let mut initial = Document::new();
        initial.insert(DEFAULT_SECTION.to_string(), schema.defaults());
        let store = ConfigStore::open(path, Some(&initial))?;

        let mut section = schema.defaults();
        for (key, raw) in store.load_section(DEFAULT_SECTION)? {
            if schema.field(&key).is_none() {
                debug!("Ignoring unknown key '{}' in {}", key, store.path().display());
                continue;
            }
            match schema.validate(&json!({ key.as_str(): raw }), ValidationMode::Patch) {
                Ok(valid) => section.extend(valid),
                Err(e) => warn!(
                    "Ignoring invalid '{}' in {} ({}), using default",
                    key,
                    store.path().display(),
                    e
                ),
            }
        }
        Ok(Self::from_section(&section))
    }

    /// Build from a section already normalized by [`app_schema`]
    fn from_section(section: &Section) -> Self {
        let defaults = Self::default();
        Self {
            host: section.get(HOST).cloned().unwrap_or(defaults.host),
            port: section
                .get(PORT)
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            debug: section.get(DEBUG).map_or(defaults.debug, |b| b == "true"),
            cors: section.get(CORS).map_or(defaults.cors, |b| b == "true"),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_first_load_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.ini");
        let settings = AppSettings::load(&path).unwrap();
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.bind_addr(), "0.0.0.0:5000");

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("port = 5000"));
    }

    #[test]
    fn test_reads_operator_edits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.ini");
        fs::write(
            &path,
            "[DEFAULT]\nhost = 127.0.0.1\nport = 8080\ndebug = True\ncors = false\n",
        )
        .unwrap();

        let settings = AppSettings::load(&path).unwrap();
        assert_eq!(settings.bind_addr(), "127.0.0.1:8080");
        assert!(settings.debug);
        assert!(!settings.cors);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.ini");
        fs::write(&path, "[DEFAULT]\nport = 70000\ndebug = maybe\n").unwrap();

        let settings = AppSettings::load(&path).unwrap();
        assert_eq!(settings.port, DEFAULT_PORT);
        assert!(!settings.debug);
    }

    #[test]
    fn test_stored_values_are_normalized_by_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.ini");
        fs::write(
            &path,
            "[DEFAULT]\nhost =\nport = 0\ncors = FALSE\nworkers = 4\n",
        )
        .unwrap();

        let settings = AppSettings::load(&path).unwrap();
        // empty host takes the default, port 0 is below the range
        assert_eq!(settings.host, DEFAULT_HOST);
        assert_eq!(settings.port, DEFAULT_PORT);
        assert!(!settings.cors);
        // the file itself is left as the operator wrote it
        assert!(fs::read_to_string(&path).unwrap().contains("workers = 4"));
    }
}
