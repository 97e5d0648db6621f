//! Smoke test: deploy file on disk through a dry run

use deploy_pipeline::adapters::{
    InMemoryCluster, InMemoryControlPlane, InMemoryInstaller, Mutation, MutationLog,
};
use deploy_pipeline::core::resolver::EnvSnapshot;
use deploy_pipeline::{
    deploy, standard_pipeline, Adapters, DeployConfig, ExecutionEngine, PipelineStatus,
    StageOptions,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const STATE_JSON: &str = r#"{
  "aks_cluster": { "value": { "name": "smoke-aks" } },
  "resource_group": { "value": { "name": "rg-smoke", "location": "westeurope" } },
  "control_plane": { "value": { "url": "https://osmo.smoke.test" } },
  "storage_account": { "value": { "name": "smokestore", "primary_access_key": "smoke-key" } }
}"#;

const DEPLOY_YAML: &str = r#"
name: smoke
state_file: outputs.json
modes:
  credential_strategy: shared-key
  registry_source: private-mirror
values:
  registry.server: smoke.azurecr.io
  pool.name: smoke-pool
token:
  ttl: "+6 months"
releases:
  - name: backend-operator
    chart: osmo/backend-operator
    version: "1.2.0"
    values:
      global:
        logLevel: debug
"#;

#[tokio::test]
async fn test_deploy_file_dry_run() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("outputs.json"), STATE_JSON).unwrap();
    let file = dir.path().join("deploy.yaml");
    std::fs::write(&file, DEPLOY_YAML).unwrap();

    let config = DeployConfig::from_file(&file).unwrap();
    assert_eq!(config.name, "smoke");
    let state = dir.path().join(config.state_file.as_ref().unwrap());

    let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
    let mut ctx =
        deploy::prepare_on(&config, &BTreeMap::new(), EnvSnapshot::default(), Some(&state), today)
            .unwrap();
    assert_eq!(ctx.value("pool.name").as_deref(), Some("smoke-pool"));

    let log = MutationLog::new();
    let adapters = Adapters {
        cluster: Arc::new(InMemoryCluster::new(log.clone())),
        installer: Arc::new(InMemoryInstaller::new(log.clone())),
        control_plane: Arc::new(InMemoryControlPlane::new(log.clone())),
    };
    let options = StageOptions {
        force_rotate: false,
        today: chrono::NaiveDate::from_ymd_opt(2026, 1, 31),
    };
    let mut pipeline = standard_pipeline(&config, &adapters, &options);

    let report = ExecutionEngine::new()
        .run(&mut pipeline, &mut ctx)
        .await
        .into_result()
        .unwrap();
    assert_eq!(report.status, PipelineStatus::Completed);

    let mutations = log.entries();
    let release = mutations
        .iter()
        .find_map(|m| match m {
            Mutation::Release { values, .. } => Some(values),
            _ => None,
        })
        .unwrap();
    assert_eq!(release["global"]["logLevel"], "debug");
    assert_eq!(release["global"]["serviceUrl"], "https://osmo.smoke.test");

    let token_expiry = mutations.iter().find_map(|m| match m {
        Mutation::Token { expires_on, .. } => *expires_on,
        _ => None,
    });
    assert_eq!(token_expiry, chrono::NaiveDate::from_ymd_opt(2026, 7, 31));

    assert!(mutations
        .iter()
        .any(|m| matches!(m, Mutation::DefaultProfile { key, .. } if key == "smoke-pool")));
}

#[test]
fn test_invalid_deploy_file_is_rejected() {
    let yaml = "name: broken\ntoken:\n  roles: []\n";
    assert!(DeployConfig::from_yaml(yaml).is_err());
}
