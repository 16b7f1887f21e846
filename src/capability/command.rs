//! Capability backed by an external command.
//!
//! The command runs through `sh -c`. The task text is written to its stdin and
//! the context is passed as JSON in `PMCREW_CONTEXT`. Stdout is the response.
//! A non-zero exit is a capability failure carrying stderr.

use crate::approval::ContextMap;
use crate::capability::{AgentCapability, CapabilityError, CapabilityOutput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Raw result of running the command.
#[derive(Debug)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    /// Failure detail: stderr if there is any, the exit code otherwise.
    fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("command exited with code {}", self.exit_code)
        } else {
            format!("command exited with code {}: {}", self.exit_code, stderr)
        }
    }
}

pub struct CommandCapability {
    name: String,
    command: String,
    workdir: Option<PathBuf>,
}

impl CommandCapability {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            workdir: None,
        }
    }

    pub fn with_workdir(mut self, workdir: Option<PathBuf>) -> Self {
        self.workdir = workdir;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl AgentCapability for CommandCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        task: &str,
        context: &ContextMap,
    ) -> Result<CapabilityOutput, CapabilityError> {
        tracing::debug!(agent = %self.name, command = %self.command, "Invoking capability");

        let result = execute_command(&self.name, &self.command, self.workdir.as_deref(), task, context)
            .await
            .map_err(|e| CapabilityError::new(&self.name, format!("{:#}", e)))?;

        if result.exit_code != 0 {
            return Err(CapabilityError::new(&self.name, result.failure_detail()));
        }

        Ok(CapabilityOutput {
            agent: self.name.clone(),
            response: result.stdout.trim_end().to_string(),
        })
    }
}

/// Run `command` with the task on stdin. The child is killed if the returned
/// future is dropped.
pub async fn execute_command(
    agent: &str,
    command: &str,
    workdir: Option<&Path>,
    task: &str,
    context: &ContextMap,
) -> Result<CommandResult> {
    let context_json =
        serde_json::to_string(context).context("Failed to serialize capability context")?;

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .env("PMCREW_AGENT", agent)
        .env("PMCREW_CONTEXT", context_json)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to execute command: {}", command))?;

    if let Some(mut stdin) = child.stdin.take() {
        // A command that ignores stdin may exit before reading it.
        if let Err(e) = stdin.write_all(task.as_bytes()).await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e).context("Failed to write task to command stdin");
            }
        }
    }

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("Failed to wait for command: {}", command))?;

    Ok(CommandResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}
