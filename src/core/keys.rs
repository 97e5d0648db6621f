//! Catalog of configuration keys
//!
//! Which keys are required depends on the active deployment modes: a mode
//! that needs extra material (a storage key, an identity, a mirror) turns
//! the matching key into a required one, so a missing value fails before
//! any stage runs.

use crate::core::modes::{
    CheckpointStrategy, CredentialStrategy, DeploymentModes, ModeKind, RegistrySource,
};
use crate::core::resolver::{ConfigResolver, KeySpec};
use crate::error::DeployError;

pub const CLUSTER_NAME: &str = "cluster.name";
pub const RESOURCE_GROUP: &str = "cluster.resource_group";
pub const REGION: &str = "cluster.region";
pub const NAMESPACE_BACKEND: &str = "namespace.backend";
pub const NAMESPACE_WORKFLOWS: &str = "namespace.workflows";
pub const CONTROL_PLANE_URL: &str = "control_plane.url";
pub const BACKEND_NAME: &str = "backend.name";
pub const POOL_NAME: &str = "pool.name";
pub const POD_TEMPLATE_NAME: &str = "pod_template.name";
pub const SERVICE_ACCOUNT: &str = "workflow.service_account";
pub const STORAGE_ACCOUNT: &str = "storage.account";
pub const STORAGE_CONTAINER: &str = "storage.container";
pub const STORAGE_KEY: &str = "storage.key";
pub const IDENTITY_CLIENT_ID: &str = "identity.client_id";
pub const REGISTRY_SERVER: &str = "registry.server";
pub const REGISTRY_API_KEY: &str = "registry.api_key";
pub const CHECKPOINT_CLAIM: &str = "checkpoint.claim";
pub const CHECKPOINT_SOURCE: &str = "checkpoint.source";
pub const CHECKPOINT_PATH: &str = "checkpoint.path";
pub const TOKEN_EXPIRES_AT: &str = "token.expires_at";

/// Identifiers produced by stages and consumed by later ones
pub const TOKEN_SECRET: &str = "token.secret";
pub const PULL_SECRET: &str = "registry.pull_secret";

/// Upstream registry used when no mirror is configured
pub const UPSTREAM_REGISTRY: &str = "nvcr.io";

/// Key specs for the three mode enumerations
pub fn mode_specs() -> [KeySpec; 3] {
    [
        KeySpec::optional(ModeKind::Credential.config_key(), "storage credential strategy")
            .env("CREDENTIAL_STRATEGY")
            .default_value("federated-identity"),
        KeySpec::optional(ModeKind::Registry.config_key(), "image registry source")
            .env("REGISTRY_SOURCE")
            .default_value("public-upstream"),
        KeySpec::optional(ModeKind::Checkpoint.config_key(), "checkpoint strategy")
            .env("CHECKPOINT_STRATEGY")
            .default_value("fresh"),
    ]
}

/// Resolve and validate the deployment modes
pub fn resolve_modes(resolver: &ConfigResolver) -> Result<DeploymentModes, DeployError> {
    let [credential, registry, checkpoint] = mode_specs();
    let raw = |spec: &KeySpec| -> Result<String, DeployError> {
        Ok(resolver
            .resolve(spec)?
            .map(|value| value.as_string())
            .unwrap_or_default())
    };

    DeploymentModes::from_raw(&raw(&credential)?, &raw(&registry)?, &raw(&checkpoint)?)
}

/// The full key catalog for the given modes
pub fn catalog(modes: &DeploymentModes) -> Vec<KeySpec> {
    let mut keys = vec![
        KeySpec::required(CLUSTER_NAME, "name of the managed GPU cluster")
            .env("AKS_CLUSTER_NAME")
            .state("aks_cluster.value.name"),
        KeySpec::required(RESOURCE_GROUP, "resource group holding the cluster")
            .env("RESOURCE_GROUP")
            .state("resource_group.value.name"),
        KeySpec::required(REGION, "cloud region of the cluster")
            .env("AZURE_REGION")
            .state("resource_group.value.location"),
        KeySpec::required(CONTROL_PLANE_URL, "URL of the workflow control plane")
            .env("OSMO_URL")
            .state("control_plane.value.url"),
        KeySpec::required(STORAGE_ACCOUNT, "storage account for workflow data")
            .env("STORAGE_ACCOUNT_NAME")
            .state("storage_account.value.name"),
        KeySpec::optional(STORAGE_CONTAINER, "blob container for workflow data")
            .env("STORAGE_CONTAINER")
            .state("storage_account.value.container_name")
            .default_value("workflows"),
        KeySpec::optional(NAMESPACE_BACKEND, "namespace of the backend operator")
            .env("BACKEND_NAMESPACE")
            .default_value("osmo-operator"),
        KeySpec::optional(NAMESPACE_WORKFLOWS, "namespace workflow pods run in")
            .env("WORKFLOW_NAMESPACE")
            .default_value("osmo-workflows"),
        KeySpec::optional(BACKEND_NAME, "backend name registered with the control plane")
            .env("BACKEND_NAME")
            .default_value("default"),
        KeySpec::optional(POOL_NAME, "pool name registered with the control plane")
            .env("POOL_NAME")
            .default_value("default"),
        KeySpec::optional(POD_TEMPLATE_NAME, "pod template name")
            .env("POD_TEMPLATE_NAME")
            .default_value("gpu-workload"),
        KeySpec::optional(SERVICE_ACCOUNT, "service account of workflow pods")
            .env("WORKFLOW_SERVICE_ACCOUNT")
            .default_value("osmo-workflow"),
        KeySpec::optional(CHECKPOINT_CLAIM, "persistent volume claim holding checkpoints")
            .env("CHECKPOINT_CLAIM")
            .default_value("checkpoints"),
        KeySpec::optional(TOKEN_EXPIRES_AT, "absolute expiry date of the service token")
            .env("TOKEN_EXPIRY"),
    ];

    let storage_key = KeySpec::optional(STORAGE_KEY, "storage account access key")
        .env("STORAGE_ACCOUNT_KEY")
        .state("storage_account.value.primary_access_key")
        .sensitive();
    let client_id = KeySpec::optional(IDENTITY_CLIENT_ID, "client id of the workload identity")
        .env("WORKLOAD_IDENTITY_CLIENT_ID")
        .state("workload_identity.value.client_id");
    keys.push(match modes.credential {
        CredentialStrategy::SharedKey => storage_key.require(),
        CredentialStrategy::FederatedIdentity => storage_key,
    });
    keys.push(match modes.credential {
        CredentialStrategy::SharedKey => client_id,
        CredentialStrategy::FederatedIdentity => client_id.require(),
    });

    let server = KeySpec::optional(REGISTRY_SERVER, "image registry login server")
        .env("REGISTRY_SERVER")
        .state("container_registry.value.login_server")
        .default_value(UPSTREAM_REGISTRY);
    let api_key = KeySpec::optional(REGISTRY_API_KEY, "API key for the upstream registry")
        .env("NGC_API_KEY")
        .sensitive();
    match modes.registry {
        RegistrySource::PublicUpstream => {
            keys.push(server);
            keys.push(api_key.require());
        }
        RegistrySource::PrivateMirror => {
            keys.push(server.require());
        }
    }

    match modes.checkpoint {
        CheckpointStrategy::Fresh => {}
        CheckpointStrategy::WarmStart => keys.push(
            KeySpec::required(CHECKPOINT_SOURCE, "checkpoint to warm-start from")
                .env("CHECKPOINT_SOURCE"),
        ),
        CheckpointStrategy::Resume => keys.push(
            KeySpec::required(CHECKPOINT_PATH, "checkpoint directory to resume from")
                .env("CHECKPOINT_PATH"),
        ),
    }

    keys
}
