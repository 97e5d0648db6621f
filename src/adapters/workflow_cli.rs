//! Workflow CLI implementation of the control plane

use crate::adapters::command::{args, CommandRunner};
use crate::adapters::{AdapterError, ControlPlane, TokenRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;

#[derive(Debug, Clone)]
pub struct WorkflowCli {
    runner: CommandRunner,
}

impl WorkflowCli {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn decode_error(&self, reason: impl ToString) -> AdapterError {
        AdapterError::Decode {
            tool: self.runner.program().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Arguments for `token set`
pub fn token_args(request: &TokenRequest) -> Vec<String> {
    let mut command = args([
        "token",
        "set",
        request.name.as_str(),
        "--description",
        request.description.as_str(),
    ]);
    for role in &request.roles {
        command.push("--roles".to_string());
        command.push(role.clone());
    }
    if let Some(date) = request.expires_on {
        command.push("--expires-at".to_string());
        command.push(date.format("%Y-%m-%d").to_string());
    }
    command.push("--format-type".to_string());
    command.push("json".to_string());
    command
}

/// Extract the token value from `token set` output
///
/// The CLI prints `{"token": "..."}` in JSON mode; older releases print the
/// bare token.
pub fn parse_token(output: &str) -> Option<String> {
    let trimmed = output.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map.get("token").and_then(Value::as_str).map(str::to_string),
        Ok(_) => None,
        Err(_) => trimmed
            .lines()
            .last()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
    }
}

#[async_trait]
impl ControlPlane for WorkflowCli {
    async fn issue_token(&self, request: &TokenRequest) -> Result<String, AdapterError> {
        let output = self.runner.run(&token_args(request), None).await?;
        parse_token(&output).ok_or_else(|| self.decode_error("no token in output"))
    }

    async fn update_config(
        &self,
        section: &str,
        key: &str,
        document: &Value,
        description: &str,
    ) -> Result<(), AdapterError> {
        let body = serde_json::to_string_pretty(document).map_err(|e| self.decode_error(e))?;
        let mut file = tempfile::Builder::new()
            .prefix("config-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| self.decode_error(e))?;
        file.write_all(body.as_bytes()).map_err(|e| self.decode_error(e))?;

        let path = file.path().display().to_string();
        let command = args([
            "config",
            "update",
            section,
            key,
            "--file",
            path.as_str(),
            "--description",
            description,
        ]);
        self.runner.run(&command, None).await.map(|_| ())
    }

    async fn set_default_profile(&self, kind: &str, key: &str) -> Result<(), AdapterError> {
        self.runner
            .run(&args(["profile", "set", kind, key]), None)
            .await
            .map(|_| ())
    }
}
