//! Error types shared by the persistence engines.

use std::path::{Path, PathBuf};

/// Failures surfaced by [`ConfigStore`](super::config_store::ConfigStore),
/// [`DirectiveStore`](super::directive_store::DirectiveStore) and
/// [`InstanceRegistry`](super::instances::InstanceRegistry).
///
/// Invariant violations (second primary display, duplicate port) are not
/// errors: the merge and allocation algorithms resolve them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Referenced section, device or instance does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Backing file exists but cannot be parsed. Never repaired or overwritten.
    #[error("corrupt config file {}: line {line}: {reason}", path.display())]
    ConfigCorrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Filesystem read/write failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key or value that cannot be represented in the on-disk format
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// No control port left above the current range
    #[error("no free control port available")]
    PortsExhausted,
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(path: &Path, line: usize, reason: impl Into<String>) -> Self {
        StoreError::ConfigCorrupt {
            path: path.to_path_buf(),
            line,
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
