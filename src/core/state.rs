//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a stage that succeeded got there
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    /// The stage mutated something
    Applied,
    /// The precondition check found nothing to do
    AlreadySatisfied,
}

/// State of a single stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageState {
    Pending,
    Running {
        started_at: DateTime<Utc>,
    },
    Succeeded {
        outcome: StageOutcome,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Succeeded { .. } | StageState::Failed { .. })
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, StageState::Succeeded { .. })
    }
}

/// Overall pipeline status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    Idle,
    Running,
    Completed,
    Aborted,
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: Uuid,
    pub status: PipelineStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_stages: usize,
    pub finished_stages: usize,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: PipelineStatus::Idle,
            started_at: None,
            completed_at: None,
            total_stages: 0,
            finished_stages: 0,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_stages: usize) {
        self.status = PipelineStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_stages = total_stages;
    }

    pub fn complete(&mut self) {
        self.status = PipelineStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn abort(&mut self) {
        self.status = PipelineStatus::Aborted;
        self.completed_at = Some(Utc::now());
    }

    /// Fraction of stages finished (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_stages == 0 {
            return 0.0;
        }
        self.finished_stages as f64 / self.total_stages as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Where and why a run stopped early
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortInfo {
    pub stage: String,
    pub reason: String,
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: PipelineStatus,
    /// Stages that mutated something, in order
    pub applied: Vec<String>,
    /// Stages whose precondition was already met
    pub skipped: Vec<String>,
    pub aborted: Option<AbortInfo>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Completed
    }

    pub fn duration_secs(&self) -> f64 {
        (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
