//! Running external commands

use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use tracker_core::BackendError;

/// Exit status and captured output of a finished command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Convert a failed command into a backend error
    pub fn into_error(self, program: &str) -> BackendError {
        BackendError::Command {
            program: program.to_string(),
            status: self.status,
            stderr: self.stderr.trim().to_string(),
        }
    }
}

/// Runs a program with arguments and waits for it to finish
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, BackendError>;
}

/// CommandRunner backed by `tokio::process`
#[derive(Clone, Debug, Default)]
pub struct SystemCommandRunner {
    timeout: Option<Duration>,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill commands that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait::async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, BackendError> {
        debug!("Running {} {}", program, args.join(" "));
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);

        let output = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, command.output()).await {
                Ok(output) => output?,
                Err(_) => {
                    warn!("{} did not finish within {:?}, killed", program, timeout);
                    return Err(BackendError::Timeout {
                        program: program.to_string(),
                        timeout,
                    });
                }
            },
            None => command.output().await?,
        };

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
