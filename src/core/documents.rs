//! The configuration documents the pipeline renders
//!
//! Three documents are submitted to the control plane; the fourth is the
//! override set handed to the package installer.

use crate::core::keys;
use crate::core::modes::{CheckpointStrategy, CredentialStrategy, NormalizedMode, RegistrySource};
use crate::core::template::{ConfigTemplate, DocumentKind, FieldEdit, FieldPath, FieldTransform};
use serde_json::{json, Value};

const SHARED_KEY: NormalizedMode = NormalizedMode::Credential(CredentialStrategy::SharedKey);
const FEDERATED: NormalizedMode = NormalizedMode::Credential(CredentialStrategy::FederatedIdentity);
const PRIVATE_MIRROR: NormalizedMode = NormalizedMode::Registry(RegistrySource::PrivateMirror);
const FRESH: NormalizedMode = NormalizedMode::Checkpoint(CheckpointStrategy::Fresh);
const WARM_START: NormalizedMode = NormalizedMode::Checkpoint(CheckpointStrategy::WarmStart);
const RESUME: NormalizedMode = NormalizedMode::Checkpoint(CheckpointStrategy::Resume);

/// Pod label that opts a pod into workload identity federation
pub const WORKLOAD_IDENTITY_LABEL: &str = "azure.workload.identity/use";
pub const CLIENT_ID_ANNOTATION: &str = "azure.workload.identity/client-id";
pub const CHECKPOINT_MODE_ANNOTATION: &str = "deploy-pipeline/checkpoint-mode";
pub const CHECKPOINT_SOURCE_ANNOTATION: &str = "deploy-pipeline/checkpoint-source";

/// Storage buckets the workflow service writes to
const STORAGE_BLOCKS: [(&str, &str); 3] = [
    ("workflow_data", "data"),
    ("workflow_log", "logs"),
    ("workflow_app", "apps"),
];

fn storage_credential(prefix: &str) -> Value {
    json!({
        "endpoint": format!(
            "azure://{{{{ storage.account }}}}/{{{{ storage.container }}}}/{}",
            prefix
        ),
        "region": "{{ cluster.region }}",
        "access_key_id": "{{ storage.account }}",
        "access_key": "{{ storage.key }}",
    })
}

/// Workflow storage configuration
///
/// Under shared-key every storage block carries the account key. Under
/// federated-identity the key is dropped and the workload identity's
/// client id takes its place.
pub fn workflow_storage() -> ConfigTemplate {
    let mut body = serde_json::Map::new();
    let mut transforms = Vec::new();
    let mut secret_blocks = Vec::new();

    for (block, prefix) in STORAGE_BLOCKS {
        body.insert(block.to_string(), json!({ "credential": storage_credential(prefix) }));
        let access_key = format!("{}.credential.access_key", block);
        transforms.push(FieldTransform::remove(FEDERATED, &access_key));
        transforms.push(FieldTransform::set(
            FEDERATED,
            FieldPath::parse(&format!("{}.credential.client_id", block)),
            json!("{{ identity.client_id }}"),
        ));
        secret_blocks.push(FieldPath::parse(&format!("{}.credential", block)));
    }

    body.insert(
        "backend_images".to_string(),
        json!({
            "registry": "{{ registry.server }}",
            "credential": {
                "registry": "{{ registry.server }}",
                "username": "$oauthtoken",
                "auth": "{{ registry.api_key }}",
            }
        }),
    );
    transforms.push(FieldTransform::remove(PRIVATE_MIRROR, "backend_images.credential"));

    ConfigTemplate {
        kind: DocumentKind::WorkflowStorage,
        body: Value::Object(body),
        transforms,
        secret_blocks,
    }
}

/// Pool definition pointing at the backend and the pod template
pub fn backend_pool() -> ConfigTemplate {
    ConfigTemplate {
        kind: DocumentKind::BackendPool,
        body: json!({
            "name": "{{ pool.name }}",
            "description": "GPU pool on {{ cluster.name }}",
            "backend": "{{ backend.name }}",
            "default_platform": "gpu",
            "common_pod_template": ["{{ pod_template.name }}"],
            "platforms": {
                "gpu": {
                    "description": "GPU nodes in {{ cluster.region }}",
                    "override_pod_template": [],
                }
            }
        }),
        transforms: vec![],
        secret_blocks: vec![],
    }
}

/// Pod template applied to every workflow pod
pub fn pod_template() -> ConfigTemplate {
    ConfigTemplate {
        kind: DocumentKind::PodTemplate,
        body: json!({
            "metadata": {
                "labels": { WORKLOAD_IDENTITY_LABEL: "true" },
                "annotations": {}
            },
            "spec": {
                "serviceAccountName": "{{ workflow.service_account }}",
                "imagePullSecrets": [{ "name": "{{ registry.pull_secret }}" }],
                "nodeSelector": { "agentpool": "gpu" },
                "tolerations": [{
                    "key": "nvidia.com/gpu",
                    "operator": "Exists",
                    "effect": "NoSchedule"
                }],
                "containers": [{
                    "name": "{{USER_CONTAINER_NAME}}",
                    "volumeMounts": [{ "name": "checkpoints", "mountPath": "/checkpoints" }]
                }],
                "volumes": [{
                    "name": "checkpoints",
                    "persistentVolumeClaim": { "claimName": "{{ checkpoint.claim }}" }
                }]
            }
        }),
        transforms: vec![
            FieldTransform {
                when: SHARED_KEY,
                edit: FieldEdit::Remove(FieldPath::from_keys([
                    "metadata",
                    "labels",
                    WORKLOAD_IDENTITY_LABEL,
                ])),
            },
            FieldTransform::remove(PRIVATE_MIRROR, "spec.imagePullSecrets"),
            FieldTransform::remove(FRESH, "spec.volumes"),
            FieldTransform::remove(FRESH, "spec.containers.*.volumeMounts"),
            FieldTransform::set(
                WARM_START,
                FieldPath::from_keys(["metadata", "annotations", CHECKPOINT_MODE_ANNOTATION]),
                json!("warm-start"),
            ),
            FieldTransform::set(
                WARM_START,
                FieldPath::from_keys(["metadata", "annotations", CHECKPOINT_SOURCE_ANNOTATION]),
                json!("{{ checkpoint.source }}"),
            ),
            FieldTransform::set(
                RESUME,
                FieldPath::from_keys(["metadata", "annotations", CHECKPOINT_MODE_ANNOTATION]),
                json!("resume"),
            ),
            FieldTransform::set(
                RESUME,
                FieldPath::from_keys(["metadata", "annotations", CHECKPOINT_SOURCE_ANNOTATION]),
                json!("{{ checkpoint.path }}"),
            ),
        ],
        secret_blocks: vec![],
    }
}

/// Overrides for the backend operator release
pub fn backend_values() -> ConfigTemplate {
    ConfigTemplate {
        kind: DocumentKind::BackendValues,
        body: json!({
            "global": {
                "osmoImageLocation": "{{ registry.server }}/nvidia/osmo",
                "imagePullSecret": "{{ registry.pull_secret }}",
                "serviceUrl": "{{ control_plane.url }}",
                "agentNamespace": "{{ namespace.backend }}",
                "backendNamespace": "{{ namespace.workflows }}",
                "backendName": "{{ backend.name }}",
                "accountTokenSecret": "{{ token.secret }}",
                "loginMethod": "token"
            },
            "serviceAccount": {
                "annotations": { CLIENT_ID_ANNOTATION: "{{ identity.client_id }}" }
            },
            "podLabels": { WORKLOAD_IDENTITY_LABEL: "true" }
        }),
        transforms: vec![
            FieldTransform::remove(SHARED_KEY, "serviceAccount"),
            FieldTransform::remove(SHARED_KEY, "podLabels"),
            FieldTransform::remove(PRIVATE_MIRROR, "global.imagePullSecret"),
        ],
        secret_blocks: vec![],
    }
}

/// How the control plane names a submitted document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKey {
    Fixed(&'static str),
    /// Named after a resolved configuration key
    FromConfig(&'static str),
}

/// A document and where the control plane stores it
#[derive(Debug, Clone)]
pub struct ConfigTarget {
    pub section: &'static str,
    pub key: TargetKey,
    pub description: &'static str,
    pub template: ConfigTemplate,
}

/// Documents submitted to the control plane, in submission order
///
/// The pod template goes before the pool that references it.
pub fn control_plane_targets() -> Vec<ConfigTarget> {
    vec![
        ConfigTarget {
            section: "WORKFLOW",
            key: TargetKey::Fixed("storage"),
            description: "workflow storage credentials",
            template: workflow_storage(),
        },
        ConfigTarget {
            section: "POD_TEMPLATE",
            key: TargetKey::FromConfig(keys::POD_TEMPLATE_NAME),
            description: "GPU workload pod template",
            template: pod_template(),
        },
        ConfigTarget {
            section: "POOL",
            key: TargetKey::FromConfig(keys::POOL_NAME),
            description: "GPU backend pool",
            template: backend_pool(),
        },
    ]
}

/// Deep-merge `overlay` into `base`; objects merge, anything else replaces
pub fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::modes::DeploymentModes;
    use crate::core::template::{RenderError, Substitutions, TemplateRenderer};

    fn substitutions() -> Substitutions {
        [
            ("cluster.name", "gpu-aks"),
            ("cluster.region", "eastus2"),
            ("storage.account", "wfstore"),
            ("storage.container", "workflows"),
            ("storage.key", "s3cr3t"),
            ("identity.client_id", "11111111-2222"),
            ("registry.server", "nvcr.io"),
            ("registry.api_key", "ngc-key"),
            ("registry.pull_secret", "registry-pull"),
            ("workflow.service_account", "osmo-workflow"),
            ("checkpoint.claim", "checkpoints"),
            ("checkpoint.source", "az://ckpt/base"),
            ("checkpoint.path", "/checkpoints/run-7"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
    }

    fn modes(c: CredentialStrategy, r: RegistrySource, k: CheckpointStrategy) -> DeploymentModes {
        DeploymentModes::new(c, r, k)
    }

    #[test]
    fn test_storage_under_shared_key() {
        let subs = substitutions();
        let modes = modes(
            CredentialStrategy::SharedKey,
            RegistrySource::PublicUpstream,
            CheckpointStrategy::Fresh,
        );
        let doc = TemplateRenderer::new(&subs, &modes).render(&workflow_storage()).unwrap();

        for (block, prefix) in STORAGE_BLOCKS {
            let credential = &doc.body[block]["credential"];
            assert_eq!(credential["access_key"], "s3cr3t");
            assert_eq!(credential["endpoint"], format!("azure://wfstore/workflows/{}", prefix));
            assert!(credential.get("client_id").is_none());
        }
        assert_eq!(doc.body["backend_images"]["credential"]["auth"], "ngc-key");
    }

    #[test]
    fn test_storage_under_federated_identity_without_key() {
        let mut subs = substitutions();
        subs.remove("storage.key");
        let modes = modes(
            CredentialStrategy::FederatedIdentity,
            RegistrySource::PrivateMirror,
            CheckpointStrategy::Fresh,
        );
        let doc = TemplateRenderer::new(&subs, &modes).render(&workflow_storage()).unwrap();

        for (block, _) in STORAGE_BLOCKS {
            let credential = &doc.body[block]["credential"];
            assert!(credential.get("access_key").is_none());
            assert_eq!(credential["client_id"], "11111111-2222");
        }
        assert!(doc.body["backend_images"].get("credential").is_none());
    }

    #[test]
    fn test_missing_api_key_fails_for_upstream_registry() {
        let mut subs = substitutions();
        subs.remove("registry.api_key");
        let modes = modes(
            CredentialStrategy::FederatedIdentity,
            RegistrySource::PublicUpstream,
            CheckpointStrategy::Fresh,
        );
        let err = TemplateRenderer::new(&subs, &modes).render(&workflow_storage()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::MissingSubstitution { placeholder, .. }
                if placeholder == "registry.api_key"
        ));
    }

    #[test]
    fn test_pod_template_fresh_has_no_checkpoint_volume() {
        let subs = substitutions();
        let modes = modes(
            CredentialStrategy::SharedKey,
            RegistrySource::PrivateMirror,
            CheckpointStrategy::Fresh,
        );
        let doc = TemplateRenderer::new(&subs, &modes).render(&pod_template()).unwrap();

        assert!(doc.body["spec"].get("volumes").is_none());
        assert!(doc.body["spec"]["containers"][0].get("volumeMounts").is_none());
        assert!(doc.body["spec"].get("imagePullSecrets").is_none());
        assert!(doc.body["metadata"]["labels"].get(WORKLOAD_IDENTITY_LABEL).is_none());
        assert_eq!(doc.body["spec"]["containers"][0]["name"], "{{USER_CONTAINER_NAME}}");
    }

    #[test]
    fn test_pod_template_resume_annotates_path() {
        let subs = substitutions();
        let modes = modes(
            CredentialStrategy::FederatedIdentity,
            RegistrySource::PublicUpstream,
            CheckpointStrategy::Resume,
        );
        let doc = TemplateRenderer::new(&subs, &modes).render(&pod_template()).unwrap();

        let annotations = &doc.body["metadata"]["annotations"];
        assert_eq!(annotations[CHECKPOINT_MODE_ANNOTATION], "resume");
        assert_eq!(annotations[CHECKPOINT_SOURCE_ANNOTATION], "/checkpoints/run-7");
        let volume = &doc.body["spec"]["volumes"][0];
        assert_eq!(volume["persistentVolumeClaim"]["claimName"], "checkpoints");
        assert_eq!(doc.body["spec"]["imagePullSecrets"][0]["name"], "registry-pull");
        assert_eq!(doc.body["metadata"]["labels"][WORKLOAD_IDENTITY_LABEL], "true");
    }

    #[test]
    fn test_merge_values() {
        let mut base = json!({"global": {"a": 1, "b": 2}, "list": [1, 2]});
        merge_values(&mut base, &json!({"global": {"b": 3, "c": 4}, "list": [9]}));
        assert_eq!(base, json!({"global": {"a": 1, "b": 3, "c": 4}, "list": [9]}));
    }
}
