//! Layered key-value configuration store backed by an INI-style text file.
//!
//! # Purpose
//!
//! Single source of truth for scalar settings (node name, volume, per-instance
//! player settings...). One `[DEFAULT]` section holds the base values; named
//! sections store only the keys that differ from it (sparse overrides).
//!
//! # File format
//!
//! ```text
//! [DEFAULT]
//! nodeName = Media Node
//! volume = 50
//!
//! [kitchen]
//! volume = 20
//! ```
//!
//! Keys are case-sensitive, values are plain strings. `#`/`;` comment lines
//! and blank lines are accepted on read but not preserved on write.
//!
//! # Concurrency
//!
//! Every mutation is a full-document read-modify-write held under the store's
//! mutex, written atomically via [`write_atomic`]. Use one `ConfigStore` per
//! file per process.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;
use log::{debug, trace};
use serde::Serialize;

use super::error::{StoreError, StoreResult};
use super::fsio::{read_optional, write_atomic};

/// Name of the section every named section inherits from
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Ordered key → value mapping of one section
pub type Section = IndexMap<String, String>;

/// Section name → section content
pub type Document = IndexMap<String, Section>;

/// Typed view of a stored string value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ConfigValue {
    /// Coerce a raw value: integer, else float, else `true`/`false`, else string.
    pub fn coerce(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return ConfigValue::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return ConfigValue::Float(f);
            }
        }
        if raw.eq_ignore_ascii_case("true") {
            return ConfigValue::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return ConfigValue::Bool(false);
        }
        ConfigValue::Str(raw.to_string())
    }
}

pub type TypedSection = IndexMap<String, ConfigValue>;

fn coerce_section(section: &Section) -> TypedSection {
    section
        .iter()
        .map(|(k, v)| (k.clone(), ConfigValue::coerce(v)))
        .collect()
}

/// Keep only keys absent from `defaults` or whose value differs.
fn sparse(defaults: &Section, section: &Section) -> Section {
    section
        .iter()
        .filter(|(k, v)| defaults.get(k.as_str()) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Layered persistent key-value store.
pub struct ConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConfigStore {
    /// Handle for `path` without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Handle for `path`; when the file does not exist yet and `defaults` is
    /// given, the defaults are written as the initial document.
    pub fn open(path: impl Into<PathBuf>, defaults: Option<&Document>) -> StoreResult<Self> {
        let store = Self::new(path);
        if let Some(data) = defaults {
            if !store.path.exists() {
                debug!("Initializing config {}", store.path.display());
                store.save(data, false, true)?;
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The mutex protects no data, a poisoned guard is still usable
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stored content of `name`. Named sections come back sparse: only keys
    /// that differ from (or are absent from) the default section. Unknown
    /// sections yield an empty mapping.
    pub fn load_section(&self, name: &str) -> StoreResult<Section> {
        let doc = self.read_document()?;
        Ok(section_view(&doc, name))
    }

    /// Default section overlaid with the overrides of `name`.
    /// Unknown named sections yield an empty mapping.
    pub fn load_effective(&self, name: &str) -> StoreResult<Section> {
        let doc = self.read_document()?;
        let defaults = &doc[DEFAULT_SECTION];
        if name == DEFAULT_SECTION {
            return Ok(defaults.clone());
        }
        match doc.get(name) {
            None => Ok(Section::new()),
            Some(section) => {
                let mut merged = defaults.clone();
                merged.extend(sparse(defaults, section));
                Ok(merged)
            }
        }
    }

    /// Every section, named ones reduced to their overrides.
    pub fn load(&self) -> StoreResult<Document> {
        let doc = self.read_document()?;
        Ok(doc
            .keys()
            .map(|name| (name.clone(), section_view(&doc, name)))
            .collect())
    }

    pub fn load_section_typed(&self, name: &str) -> StoreResult<TypedSection> {
        Ok(coerce_section(&self.load_section(name)?))
    }

    pub fn load_typed(&self) -> StoreResult<IndexMap<String, TypedSection>> {
        Ok(self
            .load()?
            .iter()
            .map(|(name, section)| (name.clone(), coerce_section(section)))
            .collect())
    }

    /// True if the file currently has a section named `name`
    /// (the default section always exists).
    pub fn has_section(&self, name: &str) -> StoreResult<bool> {
        Ok(self.read_document()?.contains_key(name))
    }

    /// Merge `data` into section `name`, creating it if needed.
    ///
    /// Without `overwrite` only the keys in `data` change; a named section is
    /// then reduced to the keys that differ from the defaults, so setting a
    /// key back to its default value drops the override. With `overwrite` the
    /// section content becomes exactly `data`.
    pub fn save_section(&self, data: &Section, name: &str, overwrite: bool) -> StoreResult<()> {
        validate_section(name, data)?;
        let _guard = self.guard();
        let mut doc = self.read_document()?;
        merge_section(&mut doc, name, data, overwrite);
        self.write_document(&doc)
    }

    /// Bulk variant of [`save_section`](Self::save_section).
    ///
    /// `overwrite_config` skips reading the existing file and replaces the
    /// whole document with `data`; only meant for first initialization.
    pub fn save(
        &self,
        data: &Document,
        overwrite_sections: bool,
        overwrite_config: bool,
    ) -> StoreResult<()> {
        for (name, section) in data {
            validate_section(name, section)?;
        }
        let _guard = self.guard();

        let mut doc = if overwrite_config {
            empty_document()
        } else {
            self.read_document()?
        };

        if overwrite_config {
            for (name, section) in data {
                doc.insert(name.clone(), section.clone());
            }
            return self.write_document(&doc);
        }

        // Defaults first so named sections diff against the new values
        if let Some(defaults) = data.get(DEFAULT_SECTION) {
            merge_section(&mut doc, DEFAULT_SECTION, defaults, overwrite_sections);
        }
        for (name, section) in data.iter().filter(|(n, _)| *n != DEFAULT_SECTION) {
            merge_section(&mut doc, name, section, overwrite_sections);
        }
        self.write_document(&doc)
    }

    fn read_document(&self) -> StoreResult<Document> {
        match read_optional(&self.path)? {
            Some(text) => parse_document(&self.path, &text),
            None => Ok(empty_document()),
        }
    }

    fn write_document(&self, doc: &Document) -> StoreResult<()> {
        trace!("Writing {} sections to {}", doc.len(), self.path.display());
        write_atomic(&self.path, &render_document(doc))
    }
}

fn empty_document() -> Document {
    let mut doc = Document::new();
    doc.insert(DEFAULT_SECTION.to_string(), Section::new());
    doc
}

fn section_view(doc: &Document, name: &str) -> Section {
    let defaults = &doc[DEFAULT_SECTION];
    match doc.get(name) {
        None => Section::new(),
        Some(section) if name == DEFAULT_SECTION => section.clone(),
        Some(section) => sparse(defaults, section),
    }
}

fn merge_section(doc: &mut Document, name: &str, data: &Section, overwrite: bool) {
    if overwrite {
        doc.insert(name.to_string(), data.clone());
        return;
    }
    if name == DEFAULT_SECTION {
        let defaults = doc.entry(name.to_string()).or_default();
        for (k, v) in data {
            defaults.insert(k.clone(), v.clone());
        }
        return;
    }

    let defaults = doc[DEFAULT_SECTION].clone();
    let mut merged = doc.get(name).map(|s| sparse(&defaults, s)).unwrap_or_default();
    for (k, v) in data {
        merged.insert(k.clone(), v.clone());
    }
    doc.insert(name.to_string(), sparse(&defaults, &merged));
}

fn validate_section(name: &str, section: &Section) -> StoreResult<()> {
    if name.is_empty() || name.contains([']', '\n', '\r']) || name.trim() != name {
        return Err(StoreError::InvalidValue {
            key: name.to_string(),
            reason: "invalid section name".into(),
        });
    }
    for (key, value) in section {
        let bad_key = key.is_empty()
            || key.trim() != key
            || key.contains(['=', ':', '\n', '\r'])
            || key.starts_with(['[', '#', ';']);
        if bad_key {
            return Err(StoreError::InvalidValue {
                key: key.clone(),
                reason: "invalid key".into(),
            });
        }
        if value.contains(['\n', '\r']) {
            return Err(StoreError::InvalidValue {
                key: key.clone(),
                reason: "line breaks are not allowed".into(),
            });
        }
        if value.trim() != value {
            return Err(StoreError::InvalidValue {
                key: key.clone(),
                reason: "leading or trailing whitespace".into(),
            });
        }
    }
    Ok(())
}

fn parse_document(path: &Path, text: &str) -> StoreResult<Document> {
    let mut doc = empty_document();
    let mut seen: HashSet<String> = HashSet::new();
    let mut current: Option<String> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') {
            let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) else {
                return Err(StoreError::corrupt(path, line_no, "unterminated section header"));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(StoreError::corrupt(path, line_no, "empty section name"));
            }
            if !seen.insert(name.to_string()) {
                return Err(StoreError::corrupt(path, line_no, format!("duplicate section '{}'", name)));
            }
            doc.entry(name.to_string()).or_default();
            current = Some(name.to_string());
            continue;
        }

        let Some(section_name) = current.as_ref() else {
            return Err(StoreError::corrupt(path, line_no, "entry before any section header"));
        };
        let Some(split) = line.find(['=', ':']) else {
            return Err(StoreError::corrupt(path, line_no, "expected 'key = value'"));
        };
        let key = line[..split].trim();
        let value = line[split + 1..].trim();
        if key.is_empty() {
            return Err(StoreError::corrupt(path, line_no, "empty key"));
        }

        let section = doc.entry(section_name.clone()).or_default();
        if section.insert(key.to_string(), value.to_string()).is_some() {
            return Err(StoreError::corrupt(path, line_no, format!("duplicate key '{}'", key)));
        }
    }

    Ok(doc)
}

fn render_document(doc: &Document) -> String {
    let mut out = String::new();
    let defaults = doc.get(DEFAULT_SECTION);
    let ordered = defaults
        .filter(|d| !d.is_empty())
        .map(|d| (DEFAULT_SECTION, d))
        .into_iter()
        .chain(
            doc.iter()
                .filter(|(name, _)| *name != DEFAULT_SECTION)
                .map(|(name, section)| (name.as_str(), section)),
        );

    for (name, section) in ordered {
        out.push('[');
        out.push_str(name);
        out.push_str("]\n");
        for (key, value) in section {
            if value.is_empty() {
                out.push_str(&format!("{} =\n", key));
            } else {
                out.push_str(&format!("{} = {}\n", key, value));
            }
        }
        out.push('\n');
    }
    out
}
