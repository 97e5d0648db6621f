//! Namespace stage

use crate::adapters::ClusterApi;
use crate::core::keys;
use crate::core::{Precondition, PipelineContext, Stage};
use crate::error::DeployError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Creates the backend and workflow namespaces
pub struct NamespacesStage {
    cluster: Arc<dyn ClusterApi>,
    timeout: Duration,
}

impl NamespacesStage {
    pub fn new(cluster: Arc<dyn ClusterApi>, timeout: Duration) -> Self {
        Self { cluster, timeout }
    }

    fn namespaces(ctx: &PipelineContext) -> Result<Vec<String>, DeployError> {
        let mut names = vec![
            ctx.require(keys::NAMESPACE_BACKEND)?,
            ctx.require(keys::NAMESPACE_WORKFLOWS)?,
        ];
        names.dedup();
        Ok(names)
    }

    async fn missing(&self, ctx: &PipelineContext) -> Result<Vec<String>, DeployError> {
        let mut missing = Vec::new();
        for name in Self::namespaces(ctx)? {
            let exists = self
                .cluster
                .namespace_exists(&name)
                .await
                .map_err(|e| DeployError::adapter(format!("check namespace {}", name), e))?;
            if !exists {
                missing.push(name);
            }
        }
        Ok(missing)
    }
}

#[async_trait]
impl Stage for NamespacesStage {
    fn id(&self) -> &str {
        "namespaces"
    }

    fn description(&self) -> &str {
        "Create namespaces"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn check(&self, ctx: &mut PipelineContext) -> Result<Precondition, DeployError> {
        if self.missing(ctx).await?.is_empty() {
            Ok(Precondition::Satisfied)
        } else {
            Ok(Precondition::Needed)
        }
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), DeployError> {
        for name in self.missing(ctx).await? {
            info!("Creating namespace {}", name);
            self.cluster
                .apply_namespace(&name)
                .await
                .map_err(|e| DeployError::adapter(format!("create namespace {}", name), e))?;
        }
        Ok(())
    }

    async fn verify(&self, ctx: &PipelineContext) -> Result<(), DeployError> {
        match self.missing(ctx).await?.first() {
            None => Ok(()),
            Some(name) => Err(DeployError::VerificationFailed {
                stage: self.id().to_string(),
                reason: format!("namespace {} still missing", name),
            }),
        }
    }
}
