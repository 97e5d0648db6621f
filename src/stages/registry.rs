//! Registry authentication stage

use crate::adapters::{ClusterApi, SecretKind};
use crate::core::credential::{CredentialManager, CredentialRequest, ExpiryPolicy, SecretPayload};
use crate::core::keys;
use crate::core::modes::RegistrySource;
use crate::core::{Precondition, PipelineContext, Stage};
use crate::error::DeployError;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Name of the image pull secret written to each namespace
pub const PULL_SECRET_NAME: &str = "registry-credentials";

/// Username the upstream registry expects alongside an API key
const API_KEY_USERNAME: &str = "$oauthtoken";

/// Writes the image pull secret for the upstream registry
///
/// A private mirror is attached to the cluster directly, so under
/// `private-mirror` the stage has nothing to do.
pub struct RegistryStage {
    credentials: CredentialManager,
    cluster: Arc<dyn ClusterApi>,
    force: bool,
    timeout: Duration,
}

impl RegistryStage {
    pub fn new(
        credentials: CredentialManager,
        cluster: Arc<dyn ClusterApi>,
        force: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            cluster,
            force,
            timeout,
        }
    }

    fn scopes(ctx: &PipelineContext) -> Result<Vec<String>, DeployError> {
        let mut scopes = vec![
            ctx.require(keys::NAMESPACE_BACKEND)?,
            ctx.require(keys::NAMESPACE_WORKFLOWS)?,
        ];
        scopes.dedup();
        Ok(scopes)
    }

    async fn all_present(&self, ctx: &PipelineContext) -> Result<bool, DeployError> {
        for scope in Self::scopes(ctx)? {
            let exists = self
                .cluster
                .secret_exists(PULL_SECRET_NAME, &scope)
                .await
                .map_err(|e| {
                    DeployError::adapter(format!("check secret {}", PULL_SECRET_NAME), e)
                })?;
            if !exists {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Docker config payload authenticating `server` with an API key
pub fn docker_config(server: &str, api_key: &str) -> SecretPayload {
    let config = json!({
        "auths": {
            server: {
                "username": API_KEY_USERNAME,
                "password": api_key,
            }
        }
    });
    SecretPayload {
        kind: SecretKind::DockerConfigJson,
        entries: BTreeMap::from([(".dockerconfigjson".to_string(), config.to_string())]),
    }
}

#[async_trait]
impl Stage for RegistryStage {
    fn id(&self) -> &str {
        "registry-auth"
    }

    fn description(&self) -> &str {
        "Authenticate to the image registry"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn check(&self, ctx: &mut PipelineContext) -> Result<Precondition, DeployError> {
        if ctx.modes.registry == RegistrySource::PrivateMirror {
            info!("Using private mirror, no pull secret needed");
            return Ok(Precondition::Satisfied);
        }

        if !self.force && self.all_present(ctx).await? {
            ctx.discover(keys::PULL_SECRET, PULL_SECRET_NAME);
            return Ok(Precondition::Satisfied);
        }
        Ok(Precondition::Needed)
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), DeployError> {
        let server = ctx.require(keys::REGISTRY_SERVER)?;
        let api_key = ctx.require(keys::REGISTRY_API_KEY)?;

        for scope in Self::scopes(ctx)? {
            let request = CredentialRequest::new(PULL_SECRET_NAME, scope)
                .with_expiry(ExpiryPolicy::Never)
                .forced(self.force);
            let payload = docker_config(&server, &api_key);
            let credential = self
                .credentials
                .ensure(&request, |_| async move { Ok(payload) })
                .await?;
            ctx.credentials.push(credential);
        }

        ctx.discover(keys::PULL_SECRET, PULL_SECRET_NAME);
        Ok(())
    }

    async fn verify(&self, ctx: &PipelineContext) -> Result<(), DeployError> {
        if ctx.modes.registry == RegistrySource::PrivateMirror || self.all_present(ctx).await? {
            return Ok(());
        }
        Err(DeployError::VerificationFailed {
            stage: self.id().to_string(),
            reason: format!("secret {} missing", PULL_SECRET_NAME),
        })
    }
}
