//! Persistence engines shared by every feature area.
//!
//! - [`config_store`] - layered INI store with sparse named sections
//! - [`directive`] / [`directive_store`] - per-device `xrandr` lines with merge-on-write
//! - [`instances`] / [`ports`] - per-instance files and control port allocation
//! - [`schema`] - recognized keys, defaults and validation per call site

pub mod config_store;
pub mod directive;
pub mod directive_store;
pub mod error;
pub mod fsio;
pub mod instances;
pub mod ports;
pub mod schema;

pub use config_store::{ConfigStore, ConfigValue, DEFAULT_SECTION, Document, Section};
pub use directive::{Directive, Flag};
pub use directive_store::DirectiveStore;
pub use error::{StoreError, StoreResult};
pub use instances::{InstanceKind, InstanceRecord, InstanceRegistry};
pub use ports::next_port;
pub use schema::{Field, Schema, SchemaError, ValidationMode};
