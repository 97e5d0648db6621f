//! Persistence layer for deployment run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

use crate::core::modes::DeploymentModes;
use crate::core::{PipelineStatus, RunReport};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of one deployment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// Deployment name from the deploy file
    pub deployment: String,

    /// Active modes, as displayed
    pub modes: String,

    pub status: PipelineStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    /// Stages that mutated something
    pub applied: Vec<String>,

    /// Stages that were already satisfied
    pub skipped: Vec<String>,

    /// Stage the run stopped at
    pub aborted_stage: Option<String>,

    /// Why it stopped
    pub failure: Option<String>,
}

impl RunSummary {
    pub fn from_report(deployment: &str, modes: &DeploymentModes, report: &RunReport) -> Self {
        Self {
            run_id: report.run_id,
            deployment: deployment.to_string(),
            modes: modes.to_string(),
            status: report.status,
            started_at: report.started_at,
            completed_at: report.completed_at,
            applied: report.applied.clone(),
            skipped: report.skipped.clone(),
            aborted_stage: report.aborted.as_ref().map(|a| a.stage.clone()),
            failure: report.aborted.as_ref().map(|a| a.reason.clone()),
        }
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run, replacing any earlier record with the same ID
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// List runs of a deployment, newest first
    async fn list_runs(&self, deployment: &str) -> Result<Vec<RunSummary>>;

    /// List all deployment names
    async fn list_deployments(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for tests or `--no-history`)
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn list_runs(&self, deployment: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| r.deployment == deployment)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_deployments(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.deployment.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AbortInfo;
    use chrono::Duration;

    fn report(started_at: DateTime<Utc>, aborted: Option<AbortInfo>) -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            status: if aborted.is_some() {
                PipelineStatus::Aborted
            } else {
                PipelineStatus::Completed
            },
            applied: vec!["namespaces".to_string()],
            skipped: vec!["credentials".to_string()],
            aborted,
            started_at,
            completed_at: started_at + Duration::seconds(5),
        }
    }

    #[test]
    fn test_summary_from_aborted_report() {
        let aborted = AbortInfo {
            stage: "install-packages".to_string(),
            reason: "stage timed out after 600 seconds".to_string(),
        };
        let report = report(Utc::now(), Some(aborted));
        let summary = RunSummary::from_report("gpu-backend", &DeploymentModes::default(), &report);
        assert_eq!(summary.status, PipelineStatus::Aborted);
        assert_eq!(summary.aborted_stage.as_deref(), Some("install-packages"));
        assert_eq!(summary.modes, "federated-identity, public-upstream, fresh");
    }

    #[tokio::test]
    async fn test_in_memory_lists_newest_first() {
        let store = InMemoryPersistence::new();
        let modes = DeploymentModes::default();
        let now = Utc::now();
        let older =
            RunSummary::from_report("gpu-backend", &modes, &report(now - Duration::hours(1), None));
        let newer = RunSummary::from_report("gpu-backend", &modes, &report(now, None));
        let other = RunSummary::from_report("cpu-backend", &modes, &report(now, None));

        for run in [&older, &newer, &other] {
            store.save_run(run).await.unwrap();
        }

        let runs = store.list_runs("gpu-backend").await.unwrap();
        assert_eq!(runs, vec![newer.clone(), older]);
        assert_eq!(store.list_deployments().await.unwrap(), vec!["cpu-backend", "gpu-backend"]);
        assert_eq!(store.load_run(newer.run_id).await.unwrap(), Some(newer));
    }
}
