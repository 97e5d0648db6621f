//! Interfaces to the external tools the pipeline drives
//!
//! The core never shells out directly: every cluster, package and control
//! plane mutation goes through one of the traits below. The subprocess
//! implementations wrap `kubectl`, `helm` and the workflow CLI; the
//! in-memory ones record mutations for dry runs and tests.

pub mod command;
pub mod error;
pub mod helm;
pub mod kubectl;
pub mod memory;
pub mod workflow_cli;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub use command::CommandRunner;
pub use error::AdapterError;
pub use helm::HelmInstaller;
pub use kubectl::KubectlCluster;
pub use memory::{InMemoryCluster, InMemoryControlPlane, InMemoryInstaller, Mutation, MutationLog};
pub use workflow_cli::WorkflowCli;

/// Annotation carrying the expiry date of a generated secret
pub const EXPIRY_ANNOTATION: &str = "deploy-pipeline/expires-on";

/// Type of a cluster secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretKind {
    Opaque,
    DockerConfigJson,
}

impl SecretKind {
    /// The cluster's name for this secret type
    pub fn type_name(&self) -> &'static str {
        match self {
            SecretKind::Opaque => "Opaque",
            SecretKind::DockerConfigJson => "kubernetes.io/dockerconfigjson",
        }
    }
}

/// A secret to create or replace in a namespace
#[derive(Debug, Clone, PartialEq)]
pub struct SecretSpec {
    pub name: String,
    pub namespace: String,
    pub kind: SecretKind,
    pub entries: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// A chart release to install or upgrade
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseRequest {
    pub name: String,
    pub chart: String,
    pub repo: Option<String>,
    pub version: Option<String>,
    pub namespace: String,
    pub values: Value,
    pub timeout: Duration,
}

/// A service token to issue on the control plane
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRequest {
    pub name: String,
    pub description: String,
    pub roles: Vec<String>,
    pub expires_on: Option<NaiveDate>,
}

/// Namespaces and secrets on the cluster
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn namespace_exists(&self, name: &str) -> Result<bool, AdapterError>;

    /// Create the namespace; an existing namespace is not an error
    async fn apply_namespace(&self, name: &str) -> Result<(), AdapterError>;

    async fn secret_exists(&self, name: &str, namespace: &str) -> Result<bool, AdapterError>;

    /// Create or replace a secret in one write
    async fn apply_secret(&self, secret: &SecretSpec) -> Result<(), AdapterError>;
}

/// Installs packaged releases onto the cluster
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Install the release, or upgrade it in place when it exists
    async fn install_or_upgrade(&self, release: &ReleaseRequest) -> Result<(), AdapterError>;
}

/// The workflow orchestration control plane
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Issue a service token and return its value
    async fn issue_token(&self, request: &TokenRequest) -> Result<String, AdapterError>;

    async fn update_config(
        &self,
        section: &str,
        key: &str,
        document: &Value,
        description: &str,
    ) -> Result<(), AdapterError>;

    async fn set_default_profile(&self, kind: &str, key: &str) -> Result<(), AdapterError>;
}
