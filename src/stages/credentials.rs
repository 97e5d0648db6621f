//! Service token stage

use crate::adapters::{ClusterApi, ControlPlane, TokenRequest};
use crate::core::config::TokenSettings;
use crate::core::credential::{CredentialManager, CredentialRequest, ExpiryPolicy, SecretPayload};
use crate::core::keys;
use crate::core::{Precondition, PipelineContext, Stage};
use crate::error::DeployError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Key of the token inside the secret
pub const TOKEN_ENTRY: &str = "token";

/// Issues the backend operator's control plane token and stores it as a
/// secret in the backend namespace
pub struct TokenStage {
    credentials: CredentialManager,
    cluster: Arc<dyn ClusterApi>,
    control_plane: Arc<dyn ControlPlane>,
    settings: TokenSettings,
    force: bool,
    timeout: Duration,
}

impl TokenStage {
    pub fn new(
        credentials: CredentialManager,
        cluster: Arc<dyn ClusterApi>,
        control_plane: Arc<dyn ControlPlane>,
        settings: TokenSettings,
        force: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            cluster,
            control_plane,
            settings,
            force,
            timeout,
        }
    }

    async fn secret_exists(&self, namespace: &str) -> Result<bool, DeployError> {
        let name = &self.settings.secret_name;
        self.cluster
            .secret_exists(name, namespace)
            .await
            .map_err(|e| DeployError::adapter(format!("check secret {}", name), e))
    }

    fn expiry(&self, ctx: &PipelineContext) -> Result<ExpiryPolicy, DeployError> {
        self.settings.expiry_policy(ctx.value(keys::TOKEN_EXPIRES_AT))
    }
}

#[async_trait]
impl Stage for TokenStage {
    fn id(&self) -> &str {
        "credentials"
    }

    fn description(&self) -> &str {
        "Ensure the backend service token"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn check(&self, ctx: &mut PipelineContext) -> Result<Precondition, DeployError> {
        // a bad expiry must fail the run even when the secret already exists
        self.expiry(ctx)?.resolve(self.credentials.today())?;

        if self.force {
            return Ok(Precondition::Needed);
        }

        let namespace = ctx.require(keys::NAMESPACE_BACKEND)?;
        let exists = self.secret_exists(&namespace).await?;

        if exists {
            info!("Token secret {}/{} already present", namespace, self.settings.secret_name);
            ctx.discover(keys::TOKEN_SECRET, self.settings.secret_name.clone());
            return Ok(Precondition::Satisfied);
        }
        Ok(Precondition::Needed)
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), DeployError> {
        let namespace = ctx.require(keys::NAMESPACE_BACKEND)?;
        let request = CredentialRequest::new(self.settings.secret_name.clone(), namespace)
            .with_expiry(self.expiry(ctx)?)
            .forced(self.force);

        let control_plane = self.control_plane.clone();
        let token = TokenRequest {
            name: self.settings.token_name.clone(),
            description: format!("Backend operator token for {}", ctx.deployment),
            roles: self.settings.roles.clone(),
            expires_on: None,
        };

        let credential = self
            .credentials
            .ensure(&request, |expires_on| async move {
                let token = TokenRequest { expires_on, ..token };
                let value = control_plane
                    .issue_token(&token)
                    .await
                    .map_err(|e| DeployError::adapter("issue service token", e))?;
                Ok(SecretPayload::opaque([(TOKEN_ENTRY, value)]))
            })
            .await?;

        if let Some(date) = credential.expires_on {
            info!("Token {} expires on {}", self.settings.token_name, date);
        }
        ctx.credentials.push(credential);
        ctx.discover(keys::TOKEN_SECRET, self.settings.secret_name.clone());
        Ok(())
    }

    async fn verify(&self, ctx: &PipelineContext) -> Result<(), DeployError> {
        let namespace = ctx.require(keys::NAMESPACE_BACKEND)?;
        let exists = self.secret_exists(&namespace).await?;
        if exists {
            Ok(())
        } else {
            Err(DeployError::VerificationFailed {
                stage: self.id().to_string(),
                reason: format!("secret {} missing", self.settings.secret_name),
            })
        }
    }
}
