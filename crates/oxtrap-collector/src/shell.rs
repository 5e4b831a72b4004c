use crate::{coerce_output, CommandError, CommandRunner};
use async_trait::async_trait;
use oxtrap_common::types::{TrapValue, ValueType};
use tokio::process::Command;

/// Runs commands through the platform shell (`sh -c` / `cmd /C`).
///
/// Children are killed if the calling task is cancelled mid-run.
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            shell: default_shell().to_string(),
        }
    }

    /// Uses `shell` instead of the platform default. The command is passed
    /// after `-c` (or `/C` for `cmd`).
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    fn build(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        if self.shell.eq_ignore_ascii_case("cmd") || self.shell.eq_ignore_ascii_case("cmd.exe") {
            cmd.arg("/C");
        } else {
            cmd.arg("-c");
        }
        cmd.arg(command).kill_on_drop(true);
        cmd
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(windows)]
fn default_shell() -> &'static str {
    "cmd"
}

#[cfg(not(windows))]
fn default_shell() -> &'static str {
    "sh"
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn execute(&self, command: &str, value_type: ValueType) -> Result<TrapValue, CommandError> {
        let output = self
            .build(command)
            .output()
            .await
            .map_err(|source| CommandError::Execution {
                command: command.to_string(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();

        if !output.status.success() {
            return Err(CommandError::ExitStatus {
                command: command.to_string(),
                status: output.status,
                stderr: stderr.to_string(),
            });
        }

        if !stderr.is_empty() {
            tracing::warn!(command, stderr, "Command wrote to stderr");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        coerce_output(&stdout, value_type)
    }
}
