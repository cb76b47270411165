//! OS command execution boundary.
//!
//! Feature services apply changes to the live system through a
//! [`CommandRunner`] before persisting them. Tests swap in a scripted runner.

use std::process::Command;

use log::{info, warn};

/// Result of one command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// stdout on success, stderr or error text otherwise
    pub output: String,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, args: &[String]) -> CommandOutput;
}

/// Runs commands with [`std::process::Command`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommand;

impl CommandRunner for SystemCommand {
    fn run(&self, args: &[String]) -> CommandOutput {
        let line = args.join(" ");
        let Some((program, rest)) = args.split_first() else {
            return CommandOutput::failed("empty command");
        };

        match Command::new(program).args(rest).output() {
            Ok(out) if out.status.success() => {
                info!("Command completed: {}", line);
                CommandOutput::ok(String::from_utf8_lossy(&out.stdout))
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
                warn!("Command failed: {} ({}): {}", line, out.status, stderr.trim());
                CommandOutput::failed(stderr)
            }
            Err(e) => {
                warn!("Command could not start: {}: {}", line, e);
                CommandOutput::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every command and answers with a fixed success flag
    #[derive(Default)]
    pub struct ScriptedRunner {
        pub calls: Mutex<Vec<Vec<String>>>,
        pub fail: bool,
    }

    impl ScriptedRunner {
        pub fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, args: &[String]) -> CommandOutput {
            self.calls.lock().unwrap().push(args.to_vec());
            if self.fail {
                CommandOutput::failed("scripted failure")
            } else {
                CommandOutput::ok("")
            }
        }
    }
}
