//! Package installation stage

use crate::adapters::{PackageInstaller, ReleaseRequest};
use crate::core::config::ReleaseConfig;
use crate::core::documents::{backend_values, merge_values};
use crate::core::keys;
use crate::core::template::TemplateRenderer;
use crate::core::{Precondition, PipelineContext, Stage};
use crate::error::DeployError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Slack on top of the per-release install bound
const STAGE_MARGIN: Duration = Duration::from_secs(60);

/// Installs or upgrades the configured chart releases
///
/// The installer is idempotent, so the stage always runs: an unchanged
/// release upgrades to itself.
pub struct PackagesStage {
    installer: Arc<dyn PackageInstaller>,
    releases: Vec<ReleaseConfig>,
    install_timeout: Duration,
}

impl PackagesStage {
    pub fn new(
        installer: Arc<dyn PackageInstaller>,
        releases: Vec<ReleaseConfig>,
        install_timeout: Duration,
    ) -> Self {
        Self {
            installer,
            releases,
            install_timeout,
        }
    }
}

#[async_trait]
impl Stage for PackagesStage {
    fn id(&self) -> &str {
        "install-packages"
    }

    fn description(&self) -> &str {
        "Install backend packages"
    }

    fn timeout(&self) -> Duration {
        let count = u32::try_from(self.releases.len()).unwrap_or(u32::MAX).max(1);
        self.install_timeout.saturating_mul(count).saturating_add(STAGE_MARGIN)
    }

    async fn check(&self, _ctx: &mut PipelineContext) -> Result<Precondition, DeployError> {
        Ok(Precondition::Needed)
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), DeployError> {
        // render before touching the cluster so a bad template installs nothing
        let substitutions = ctx.substitutions();
        let rendered = TemplateRenderer::new(&substitutions, &ctx.modes).render(&backend_values())?;
        let default_namespace = ctx.require(keys::NAMESPACE_BACKEND)?;

        let mut requests = Vec::with_capacity(self.releases.len());
        for release in &self.releases {
            let mut values = rendered.body.clone();
            merge_values(&mut values, &release.values);
            requests.push(ReleaseRequest {
                name: release.name.clone(),
                chart: release.chart.clone(),
                repo: release.repo.clone(),
                version: release.version.clone(),
                namespace: release.namespace.clone().unwrap_or_else(|| default_namespace.clone()),
                values,
                timeout: self.install_timeout,
            });
        }
        ctx.documents.push(rendered);

        for request in &requests {
            info!("Installing {} ({}) into {}", request.name, request.chart, request.namespace);
            self.installer
                .install_or_upgrade(request)
                .await
                .map_err(|e| DeployError::adapter(format!("install release {}", request.name), e))?;
        }
        Ok(())
    }
}
