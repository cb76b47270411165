//! Feature services of the media node.
//!
//! Each service pairs one persistence engine from [`crate::core`] with its
//! schema and, where the change must reach the live system first, a
//! [`CommandRunner`]. Services are constructed once by the composition root
//! (`main.rs`) and shared with the HTTP handlers.

pub mod app;
pub mod command;
pub mod displays;
pub mod instances;
pub mod settings;

pub use app::AppSettings;
pub use command::{CommandOutput, CommandRunner, SystemCommand};
pub use displays::{DisplayConfig, Displays, Position, Reflect, Resolution, Rotation};
pub use instances::Instances;
pub use settings::NodeSettings;

use crate::core::{SchemaError, StoreError};

/// Failure of a feature service call
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The live-apply command failed; nothing was persisted
    #[error("command failed: {command}: {output}")]
    Command { command: String, output: String },
}

pub type NodeResult<T> = Result<T, NodeError>;

/// Run `args`, turning an unsuccessful exit into [`NodeError::Command`].
pub(crate) fn run_checked(runner: &dyn CommandRunner, args: &[String]) -> NodeResult<CommandOutput> {
    let out = runner.run(args);
    if out.success {
        Ok(out)
    } else {
        Err(NodeError::Command {
            command: args.join(" "),
            output: out.output.trim().to_string(),
        })
    }
}
