//! Test utilities for deployment scenarios

use async_trait::async_trait;
use chrono::NaiveDate;
use deploy_pipeline::adapters::{
    AdapterError, InMemoryCluster, InMemoryControlPlane, InMemoryInstaller, Mutation, MutationLog,
    PackageInstaller, ReleaseRequest,
};
use deploy_pipeline::core::resolver::EnvSnapshot;
use deploy_pipeline::core::StageState;
use deploy_pipeline::{
    deploy, standard_pipeline, Adapters, DeployConfig, DeployError, ExecutionEngine, Pipeline,
    PipelineContext, RunOutcome, StageOptions,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Date every scenario runs on
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
}

/// Provisioning outputs in `terraform output -json` shape
pub const STATE_JSON: &str = r#"{
  "aks_cluster": { "sensitive": false, "value": { "name": "gpu-aks" } },
  "resource_group": { "sensitive": false, "value": { "name": "rg-gpu", "location": "eastus2" } },
  "control_plane": { "sensitive": false, "value": { "url": "https://osmo.example.com" } },
  "storage_account": {
    "sensitive": true,
    "value": { "name": "wfstore", "container_name": "workflows", "primary_access_key": "state-key" }
  },
  "workload_identity": { "sensitive": false, "value": { "client_id": "11111111-2222" } }
}"#;

/// A state file on disk that lives as long as the returned directory
pub fn write_state(json: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outputs.json");
    std::fs::write(&path, json).unwrap();
    (dir, path)
}

/// The environment an operator would export before running
pub fn operator_env() -> EnvSnapshot {
    EnvSnapshot::from_pairs([("NGC_API_KEY", "ngc-key")])
}

/// Resolve a context from the fixture state plus explicit overrides
pub fn prepare(
    overrides: &[(&str, &str)],
    env: EnvSnapshot,
) -> Result<PipelineContext, DeployError> {
    let (_dir, state) = write_state(STATE_JSON);
    let overrides: BTreeMap<String, String> = overrides
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let config = DeployConfig::named("gpu-backend");
    deploy::prepare_on(&config, &overrides, env, Some(&state), today())
}

pub fn context(overrides: &[(&str, &str)]) -> PipelineContext {
    prepare(overrides, operator_env()).unwrap()
}

/// In-memory adapters sharing one mutation log
pub struct Harness {
    pub log: MutationLog,
    pub cluster: InMemoryCluster,
    pub control_plane: InMemoryControlPlane,
    pub installer: Arc<dyn PackageInstaller>,
}

impl Harness {
    pub fn new() -> Self {
        let log = MutationLog::new();
        Self {
            cluster: InMemoryCluster::new(log.clone()),
            control_plane: InMemoryControlPlane::new(log.clone()),
            installer: Arc::new(InMemoryInstaller::new(log.clone())),
            log,
        }
    }

    pub fn with_installer(mut self, installer: impl PackageInstaller + 'static) -> Self {
        self.installer = Arc::new(installer);
        self
    }

    pub fn adapters(&self) -> Adapters {
        Adapters {
            cluster: Arc::new(self.cluster.clone()),
            installer: self.installer.clone(),
            control_plane: Arc::new(self.control_plane.clone()),
        }
    }

    pub fn pipeline(&self, config: &DeployConfig, force_rotate: bool) -> Pipeline {
        let options = StageOptions {
            force_rotate,
            today: Some(today()),
        };
        standard_pipeline(config, &self.adapters(), &options)
    }

    /// Run the standard chain once
    pub async fn run(
        &self,
        ctx: &mut PipelineContext,
        force_rotate: bool,
    ) -> (Pipeline, RunOutcome) {
        let mut pipeline = self.pipeline(&DeployConfig::named("gpu-backend"), force_rotate);
        let outcome = ExecutionEngine::new().run(&mut pipeline, ctx).await;
        (pipeline, outcome)
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.log.entries()
    }

    pub fn count(&self, matches: fn(&Mutation) -> bool) -> usize {
        self.mutations().iter().filter(|m| matches(m)).count()
    }
}

pub fn is_token(mutation: &Mutation) -> bool {
    matches!(mutation, Mutation::Token { .. })
}

pub fn is_secret(mutation: &Mutation) -> bool {
    matches!(mutation, Mutation::Secret { .. })
}

pub fn is_release(mutation: &Mutation) -> bool {
    matches!(mutation, Mutation::Release { .. })
}

pub fn is_config(mutation: &Mutation) -> bool {
    matches!(mutation, Mutation::Config { .. })
}

/// Installer whose every call fails the way helm does
pub struct FailingInstaller;

#[async_trait]
impl PackageInstaller for FailingInstaller {
    async fn install_or_upgrade(&self, _release: &ReleaseRequest) -> Result<(), AdapterError> {
        Err(AdapterError::Exit {
            tool: "helm".to_string(),
            code: 1,
            stderr: "Error: UPGRADE FAILED: timed out waiting for the condition".to_string(),
        })
    }
}

/// Assert which stages ended in which state
pub fn assert_stage_states(pipeline: &Pipeline, expected: &[(&str, &str)]) {
    for (id, want) in expected {
        let slot = pipeline
            .slot(id)
            .unwrap_or_else(|| panic!("no stage {}", id));
        let got = match slot.state {
            StageState::Pending => "pending",
            StageState::Running { .. } => "running",
            StageState::Succeeded { .. } => "succeeded",
            StageState::Failed { .. } => "failed",
        };
        assert_eq!(got, *want, "stage {} is {} but expected {}", id, got, want);
    }
}
