//! The deployment stages and the standard chain built from them
//!
//! namespaces → registry authentication → credentials → package
//! installation → control plane configuration

pub mod configure;
pub mod credentials;
pub mod namespaces;
pub mod packages;
pub mod registry;

use crate::adapters::{ClusterApi, ControlPlane, PackageInstaller};
use crate::core::config::DeployConfig;
use crate::core::credential::CredentialManager;
use crate::core::Pipeline;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

pub use configure::ConfigureStage;
pub use credentials::TokenStage;
pub use namespaces::NamespacesStage;
pub use packages::PackagesStage;
pub use registry::RegistryStage;

/// The external systems a run talks to
#[derive(Clone)]
pub struct Adapters {
    pub cluster: Arc<dyn ClusterApi>,
    pub installer: Arc<dyn PackageInstaller>,
    pub control_plane: Arc<dyn ControlPlane>,
}

/// Per-run switches that are not part of the deploy file
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    /// Regenerate credentials even when they exist
    pub force_rotate: bool,
    /// Pin the date used for expiry computation
    pub today: Option<NaiveDate>,
}

/// Build the standard five-stage chain
pub fn standard_pipeline(
    config: &DeployConfig,
    adapters: &Adapters,
    options: &StageOptions,
) -> Pipeline {
    let stage_timeout = Duration::from_secs(config.timeouts.stage_secs);
    let install_timeout = Duration::from_secs(config.timeouts.install_secs);

    let mut credentials = CredentialManager::new(adapters.cluster.clone());
    if let Some(today) = options.today {
        credentials = credentials.with_today(today);
    }

    Pipeline::new(config.name.clone())
        .with_stage(Arc::new(NamespacesStage::new(adapters.cluster.clone(), stage_timeout)))
        .with_stage(Arc::new(RegistryStage::new(
            credentials.clone(),
            adapters.cluster.clone(),
            options.force_rotate,
            stage_timeout,
        )))
        .with_stage(Arc::new(TokenStage::new(
            credentials,
            adapters.cluster.clone(),
            adapters.control_plane.clone(),
            config.token.clone(),
            options.force_rotate,
            stage_timeout,
        )))
        .with_stage(Arc::new(PackagesStage::new(
            adapters.installer.clone(),
            config.releases.clone(),
            install_timeout,
        )))
        .with_stage(Arc::new(ConfigureStage::new(adapters.control_plane.clone(), stage_timeout)))
}
