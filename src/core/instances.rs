//! Registry of dynamically created player/browser instances.
//!
//! Each instance lives in its own `<uuid>.ini` file inside the registry
//! directory; the file's default section holds the instance settings plus
//! the reserved `uuid` and (for players) `controlPort` keys. Deleting the
//! file deletes the instance and frees its port.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, info};
use uuid::Uuid;

use super::config_store::{ConfigStore, DEFAULT_SECTION, Section};
use super::error::{StoreError, StoreResult};
use super::ports::next_port;

pub const UUID_KEY: &str = "uuid";
pub const PORT_KEY: &str = "controlPort";
const RESERVED_KEYS: &[&str] = &[UUID_KEY, PORT_KEY];
const FILE_EXT: &str = "ini";

/// What kind of process the registry manages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    /// Media player, remote-controlled over a unique local port
    Player { port_floor: u16 },
    /// Browser kiosk, no control port
    Browser,
}

impl InstanceKind {
    pub fn label(&self) -> &'static str {
        match self {
            InstanceKind::Player { .. } => "player",
            InstanceKind::Browser => "browser",
        }
    }
}

/// One persisted instance
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub uuid: String,
    pub control_port: Option<u16>,
    /// User settings, reserved keys excluded
    pub settings: Section,
}

pub struct InstanceRegistry {
    dir: PathBuf,
    kind: InstanceKind,
    // Serializes port allocation with file creation
    lock: Mutex<()>,
}

impl InstanceRegistry {
    pub fn new(dir: impl Into<PathBuf>, kind: InstanceKind) -> Self {
        Self {
            dir: dir.into(),
            kind,
            lock: Mutex::new(()),
        }
    }

    pub fn kind(&self) -> InstanceKind {
        self.kind
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist a new instance with a fresh uuid (and port, for players).
    pub fn create(&self, settings: &Section) -> StoreResult<InstanceRecord> {
        let _guard = self.guard();

        let control_port = match self.kind {
            InstanceKind::Player { port_floor } => {
                let used: BTreeSet<u16> = self
                    .scan()?
                    .iter()
                    .filter_map(|r| r.control_port)
                    .collect();
                Some(next_port(&used, port_floor).ok_or(StoreError::PortsExhausted)?)
            }
            InstanceKind::Browser => None,
        };

        let uuid = Uuid::new_v4().simple().to_string();
        let mut section = without_reserved(settings);
        section.insert(UUID_KEY.to_string(), uuid.clone());
        if let Some(port) = control_port {
            section.insert(PORT_KEY.to_string(), port.to_string());
        }

        let path = self.file_path(&uuid);
        ConfigStore::new(&path).save_section(&section, DEFAULT_SECTION, true)?;
        info!(
            "Created {} instance {} (port {:?})",
            self.kind.label(),
            uuid,
            control_port
        );

        Ok(InstanceRecord {
            uuid,
            control_port,
            settings: without_reserved(&section),
        })
    }

    pub fn get(&self, id: &str) -> StoreResult<InstanceRecord> {
        let path = self.existing_path(id)?;
        self.read_record(&path)
    }

    /// Update only the keys present in `partial`. Reserved keys are ignored.
    pub fn update(&self, id: &str, partial: &Section) -> StoreResult<InstanceRecord> {
        let _guard = self.guard();
        let path = self.existing_path(id)?;

        let data = without_reserved(partial);
        if data.len() != partial.len() {
            debug!("Ignoring reserved keys in update of {}", id);
        }
        ConfigStore::new(&path).save_section(&data, DEFAULT_SECTION, false)?;
        self.read_record(&path)
    }

    /// Remove the instance file, freeing its port.
    pub fn delete(&self, id: &str) -> StoreResult<()> {
        let _guard = self.guard();
        let path = self.existing_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted {} instance {}", self.kind.label(), id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(self.not_found(id)),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// All instances ordered by (port, uuid).
    pub fn list(&self) -> StoreResult<Vec<InstanceRecord>> {
        self.scan()
    }

    fn scan(&self) -> StoreResult<Vec<InstanceRecord>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.dir, e))?.path();
            let is_instance = path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(FILE_EXT);
            if is_instance {
                records.push(self.read_record(&path)?);
            }
        }
        records.sort_by(|a, b| {
            (a.control_port, &a.uuid).cmp(&(b.control_port, &b.uuid))
        });
        Ok(records)
    }

    fn read_record(&self, path: &Path) -> StoreResult<InstanceRecord> {
        let section = ConfigStore::new(path).load_section(DEFAULT_SECTION)?;
        let uuid = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let control_port = match self.kind {
            InstanceKind::Player { .. } => {
                let raw = section
                    .get(PORT_KEY)
                    .ok_or_else(|| StoreError::corrupt(path, 0, "missing controlPort"))?;
                let port = raw
                    .parse::<u16>()
                    .map_err(|_| StoreError::corrupt(path, 0, format!("invalid controlPort '{}'", raw)))?;
                Some(port)
            }
            InstanceKind::Browser => None,
        };

        Ok(InstanceRecord {
            uuid,
            control_port,
            settings: without_reserved(&section),
        })
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, FILE_EXT))
    }

    /// Path of an existing instance file; malformed ids are simply unknown.
    fn existing_path(&self, id: &str) -> StoreResult<PathBuf> {
        if !is_valid_id(id) {
            return Err(self.not_found(id));
        }
        let path = self.file_path(id);
        if path.is_file() {
            Ok(path)
        } else {
            Err(self.not_found(id))
        }
    }

    fn not_found(&self, id: &str) -> StoreError {
        StoreError::NotFound(format!("{} instance '{}'", self.kind.label(), id))
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn without_reserved(section: &Section) -> Section {
    section
        .iter()
        .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
