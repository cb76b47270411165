//! MEDIA-NODE - control backend for a media node appliance
//!
//! Re-exports all modules for use by the binary target.

// Persistence engines (config store, directives, instances)
pub mod core;

// Feature services and HTTP layer
pub mod node;
pub mod server;

// App modules
pub mod cli;
pub mod paths;

// Re-export commonly used types from core
pub use core::{ConfigStore, Directive, DirectiveStore, InstanceRegistry, StoreError, StoreResult};
pub use node::{NodeError, NodeResult};
pub use server::{ApiServer, AppState};
