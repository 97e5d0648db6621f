//! Control plane configuration stage

use crate::adapters::ControlPlane;
use crate::core::documents::{control_plane_targets, ConfigTarget, TargetKey};
use crate::core::keys;
use crate::core::template::{ConfigDocument, TemplateRenderer};
use crate::core::{Precondition, PipelineContext, Stage};
use crate::error::DeployError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Profile kind made the default after the pool is submitted
const POOL_PROFILE: &str = "pool";

/// Submits the rendered storage, pod template and pool documents
///
/// Every document is rendered before the first submission, so a render
/// failure leaves the control plane untouched.
pub struct ConfigureStage {
    control_plane: Arc<dyn ControlPlane>,
    timeout: Duration,
}

impl ConfigureStage {
    pub fn new(control_plane: Arc<dyn ControlPlane>, timeout: Duration) -> Self {
        Self { control_plane, timeout }
    }
}

/// Render every control plane target, pairing it with its resolved key
pub fn render_targets(
    ctx: &PipelineContext,
) -> Result<Vec<(ConfigTarget, String, ConfigDocument)>, DeployError> {
    let substitutions = ctx.substitutions();
    let renderer = TemplateRenderer::new(&substitutions, &ctx.modes);

    control_plane_targets()
        .into_iter()
        .map(|target| -> Result<_, DeployError> {
            let key = match target.key {
                TargetKey::Fixed(key) => key.to_string(),
                TargetKey::FromConfig(config_key) => ctx.require(config_key)?,
            };
            let document = renderer.render(&target.template)?;
            Ok((target, key, document))
        })
        .collect()
}

#[async_trait]
impl Stage for ConfigureStage {
    fn id(&self) -> &str {
        "configure-control-plane"
    }

    fn description(&self) -> &str {
        "Configure the control plane"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn check(&self, _ctx: &mut PipelineContext) -> Result<Precondition, DeployError> {
        // updates replace the stored document, so resubmitting is harmless
        Ok(Precondition::Needed)
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), DeployError> {
        let rendered = render_targets(ctx)?;

        for (target, key, document) in rendered {
            info!("Updating {} {} on the control plane", target.section, key);
            self.control_plane
                .update_config(target.section, &key, &document.body, target.description)
                .await
                .map_err(|e| {
                    DeployError::adapter(format!("update {} {}", target.section, key), e)
                })?;
            ctx.documents.push(document);
        }

        let pool = ctx.require(keys::POOL_NAME)?;
        self.control_plane
            .set_default_profile(POOL_PROFILE, &pool)
            .await
            .map_err(|e| DeployError::adapter(format!("set default pool {}", pool), e))?;
        Ok(())
    }
}
