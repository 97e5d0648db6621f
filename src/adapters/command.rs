//! Subprocess runner shared by the tool adapters

use crate::adapters::AdapterError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs one external tool with a bounded wall-clock time
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    timeout_secs: u64,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            timeout_secs,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Same tool with a different time limit
    pub fn with_timeout(&self, timeout_secs: u64) -> Self {
        Self {
            program: self.program.clone(),
            timeout_secs,
        }
    }

    /// Run the tool and return its stdout
    ///
    /// `stdin` is written to the child and then closed. The child is killed
    /// if the time limit elapses. Arguments are logged, so secrets must only
    /// ever travel through `stdin` or files.
    pub async fn run(&self, args: &[String], stdin: Option<&str>) -> Result<String, AdapterError> {
        debug!("Running {} {}", self.program, args.join(" "));

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| AdapterError::Spawn {
            tool: self.program.clone(),
            reason: e.to_string(),
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| AdapterError::Spawn {
                    tool: self.program.clone(),
                    reason: format!("failed to write stdin: {}", e),
                })?;
        }

        let output = timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| AdapterError::Timeout {
                tool: self.program.clone(),
                secs: self.timeout_secs,
            })?
            .map_err(|e| AdapterError::Spawn {
                tool: self.program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output.status.code().unwrap_or(-1);
            warn!("{} exited with code {}: {}", self.program, code, stderr);
            return Err(AdapterError::Exit {
                tool: self.program.clone(),
                code,
                stderr,
            });
        }

        String::from_utf8(output.stdout).map_err(|e| AdapterError::Decode {
            tool: self.program.clone(),
            reason: e.to_string(),
        })
    }
}

/// Build an argument vector from string slices
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
