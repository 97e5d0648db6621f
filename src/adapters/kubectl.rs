//! `kubectl` implementation of the cluster API

use crate::adapters::command::{args, CommandRunner};
use crate::adapters::{AdapterError, ClusterApi, SecretSpec};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct KubectlCluster {
    runner: CommandRunner,
    context: Option<String>,
}

impl KubectlCluster {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner, context: None }
    }

    /// Target a specific kubeconfig context instead of the current one
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn command(&self, items: &[&str]) -> Vec<String> {
        let mut command = args(items.iter().copied());
        if let Some(context) = &self.context {
            command.push("--context".to_string());
            command.push(context.clone());
        }
        command
    }

    /// `kubectl get` that maps NotFound to `false`
    async fn exists(&self, items: &[&str]) -> Result<bool, AdapterError> {
        match self.runner.run(&self.command(items), None).await {
            Ok(_) => Ok(true),
            Err(AdapterError::Exit { stderr, .. }) if stderr.contains("NotFound") => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Render a secret as a manifest for `kubectl apply`
pub fn secret_manifest(secret: &SecretSpec) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": secret.name,
            "namespace": secret.namespace,
            "annotations": secret.annotations,
        },
        "type": secret.kind.type_name(),
        "stringData": secret.entries,
    })
}

#[async_trait]
impl ClusterApi for KubectlCluster {
    async fn namespace_exists(&self, name: &str) -> Result<bool, AdapterError> {
        self.exists(&["get", "namespace", name, "-o", "name"]).await
    }

    async fn apply_namespace(&self, name: &str) -> Result<(), AdapterError> {
        match self.runner.run(&self.command(&["create", "namespace", name]), None).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => {
                debug!("Namespace {} created concurrently, treating as success", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn secret_exists(&self, name: &str, namespace: &str) -> Result<bool, AdapterError> {
        self.exists(&["get", "secret", name, "-n", namespace, "-o", "name"]).await
    }

    async fn apply_secret(&self, secret: &SecretSpec) -> Result<(), AdapterError> {
        let manifest =
            serde_json::to_string(&secret_manifest(secret)).map_err(|e| AdapterError::Decode {
                tool: self.runner.program().to_string(),
                reason: e.to_string(),
            })?;
        self.runner
            .run(&self.command(&["apply", "-f", "-"]), Some(&manifest))
            .await
            .map(|_| ())
    }
}
