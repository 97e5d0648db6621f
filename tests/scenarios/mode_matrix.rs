//! Test: Mode Matrix - non-default mode combinations shape stages and documents

use crate::helpers::*;
use deploy_pipeline::adapters::Mutation;
use deploy_pipeline::core::documents::{
    CHECKPOINT_MODE_ANNOTATION, CHECKPOINT_SOURCE_ANNOTATION, WORKLOAD_IDENTITY_LABEL,
};
use deploy_pipeline::core::modes::{CheckpointStrategy, CredentialStrategy, RegistrySource};
use deploy_pipeline::core::resolver::EnvSnapshot;
use deploy_pipeline::DeployError;

const MIRROR_MODES: [(&str, &str); 5] = [
    ("mode.credential_strategy", "shared_key"),
    ("mode.registry_source", "Private-Mirror"),
    ("mode.checkpoint_strategy", "resume"),
    ("registry.server", "mirror.azurecr.io"),
    ("checkpoint.path", "/checkpoints/run-42"),
];

#[tokio::test]
async fn test_shared_key_private_mirror_resume() {
    let harness = Harness::new();
    let mut ctx = prepare(&MIRROR_MODES, EnvSnapshot::default()).unwrap();

    assert_eq!(ctx.modes.credential, CredentialStrategy::SharedKey);
    assert_eq!(ctx.modes.registry, RegistrySource::PrivateMirror);
    assert_eq!(ctx.modes.checkpoint, CheckpointStrategy::Resume);

    let report = harness.run(&mut ctx, false).await.1.into_result().unwrap();
    assert_eq!(report.skipped, vec!["registry-auth"]);
    assert!(ctx.discovered("registry.pull_secret").is_none());

    // only the token secret is written
    let secrets: Vec<Mutation> = harness.mutations().into_iter().filter(is_secret).collect();
    assert!(matches!(
        &secrets[..],
        [Mutation::Secret { name, .. }] if name == "backend-service-token"
    ));

    let documents = harness.control_plane.documents();
    let storage = &documents[&("WORKFLOW".to_string(), "storage".to_string())];
    for block in ["workflow_data", "workflow_log", "workflow_app"] {
        assert_eq!(storage[block]["credential"]["access_key"], "state-key");
        assert!(storage[block]["credential"].get("client_id").is_none());
    }
    assert!(storage["backend_images"].get("credential").is_none());
    assert_eq!(storage["backend_images"]["registry"], "mirror.azurecr.io");

    let release = harness
        .mutations()
        .into_iter()
        .find_map(|m| match m {
            Mutation::Release { values, .. } => Some(values),
            _ => None,
        })
        .unwrap();
    assert!(release.get("serviceAccount").is_none());
    assert!(release.get("podLabels").is_none());
    assert!(release["global"].get("imagePullSecret").is_none());
    assert_eq!(release["global"]["osmoImageLocation"], "mirror.azurecr.io/nvidia/osmo");

    let pod_template = &documents[&("POD_TEMPLATE".to_string(), "gpu-workload".to_string())];
    let annotations = &pod_template["metadata"]["annotations"];
    assert_eq!(annotations[CHECKPOINT_MODE_ANNOTATION], "resume");
    assert_eq!(annotations[CHECKPOINT_SOURCE_ANNOTATION], "/checkpoints/run-42");
    assert!(pod_template["metadata"]["labels"].get(WORKLOAD_IDENTITY_LABEL).is_none());
    assert!(pod_template["spec"].get("imagePullSecrets").is_none());
    assert_eq!(
        pod_template["spec"]["volumes"][0]["persistentVolumeClaim"]["claimName"],
        "checkpoints"
    );
    assert_eq!(
        pod_template["spec"]["containers"][0]["volumeMounts"][0]["mountPath"],
        "/checkpoints"
    );
}

#[tokio::test]
async fn test_warm_start_annotates_source() {
    let harness = Harness::new();
    let mut ctx = context(&[
        ("mode.checkpoint_strategy", "warm-start"),
        ("checkpoint.source", "runs/base-model"),
    ]);

    harness.run(&mut ctx, false).await.1.into_result().unwrap();

    let documents = harness.control_plane.documents();
    let pod_template = &documents[&("POD_TEMPLATE".to_string(), "gpu-workload".to_string())];
    assert_eq!(pod_template["metadata"]["annotations"][CHECKPOINT_MODE_ANNOTATION], "warm-start");
    assert_eq!(
        pod_template["metadata"]["annotations"][CHECKPOINT_SOURCE_ANNOTATION],
        "runs/base-model"
    );
    assert!(pod_template["spec"].get("volumes").is_some());
}

#[test]
fn test_legacy_checkpoint_alias_means_fresh() {
    let ctx = context(&[("mode.checkpoint_strategy", "none")]);
    assert_eq!(ctx.modes.checkpoint, CheckpointStrategy::Fresh);
}

#[test]
fn test_private_mirror_requires_server() {
    let err =
        prepare(&[("mode.registry_source", "private-mirror")], EnvSnapshot::default()).unwrap_err();
    assert!(
        matches!(err, DeployError::MissingRequiredConfig { key, .. } if key == "registry.server")
    );
}

#[test]
fn test_warm_start_requires_source() {
    let err = prepare(&[("mode.checkpoint_strategy", "warm-start")], operator_env()).unwrap_err();
    assert!(
        matches!(err, DeployError::MissingRequiredConfig { key, .. } if key == "checkpoint.source")
    );
}

#[test]
fn test_shared_key_without_any_key_source() {
    let state = r#"{
      "aks_cluster": { "value": { "name": "gpu-aks" } },
      "resource_group": { "value": { "name": "rg-gpu", "location": "eastus2" } },
      "control_plane": { "value": { "url": "https://osmo.example.com" } },
      "storage_account": { "value": { "name": "wfstore" } }
    }"#;
    let (_dir, path) = write_state(state);
    let mut overrides = std::collections::BTreeMap::new();
    overrides.insert("mode.credential_strategy".to_string(), "shared-key".to_string());

    let err = deploy_pipeline::deploy::prepare(
        &deploy_pipeline::DeployConfig::named("gpu-backend"),
        &overrides,
        EnvSnapshot::default(),
        Some(&path),
    )
    .unwrap_err();

    // both the storage key and the upstream API key are reported together
    match err {
        DeployError::MissingConfiguration { missing } => {
            let keys: Vec<&str> = missing.iter().map(|(key, _)| key.as_str()).collect();
            assert!(keys.contains(&"storage.key"));
            assert!(keys.contains(&"registry.api_key"));
        }
        other => panic!("Expected MissingConfiguration, got {:?}", other),
    }
}
