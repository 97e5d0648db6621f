//! Main execution engine - drives the stage chain for one run

use crate::{
    core::{
        AbortInfo, Pipeline, PipelineContext, PipelineStatus, RunReport, StageOutcome, StageState,
    },
    error::DeployError,
    execution::StageExecutor,
};
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        pipeline_name: String,
        total_stages: usize,
    },
    StageStarted {
        stage_id: String,
        description: String,
    },
    StageSucceeded {
        stage_id: String,
        outcome: StageOutcome,
    },
    StageFailed {
        stage_id: String,
        error: String,
    },
    PipelineFinished {
        run_id: Uuid,
        status: PipelineStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Report of a run plus the error that aborted it, if any
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub error: Option<DeployError>,
}

impl RunOutcome {
    pub fn into_result(self) -> Result<RunReport, DeployError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.report),
        }
    }
}

/// Turn interrupt signals into a graceful stop, then a hard one
///
/// The first signal sets `flag`, so the engine finishes the current stage
/// and starts no other. Returns `true` when a second signal arrives and
/// `false` if the signal source gives out first.
pub async fn watch_interrupts<S, Fut>(mut next_signal: S, flag: Arc<AtomicBool>) -> bool
where
    S: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if !next_signal().await {
        return false;
    }
    warn!("Interrupt received, finishing the current stage (interrupt again to stop now)");
    flag.store(true, Ordering::SeqCst);

    if !next_signal().await {
        return false;
    }
    error!("Second interrupt received, stopping immediately");
    true
}

/// Runs stages strictly in order, stopping at the first failure
pub struct ExecutionEngine {
    executor: StageExecutor,
    event_handlers: RwLock<Vec<EventHandler>>,
    interrupted: Arc<AtomicBool>,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self {
            executor: StageExecutor::new(),
            event_handlers: RwLock::new(Vec::new()),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an interrupt flag with a signal handler
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupted = flag;
        self
    }

    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        let mut handlers = self
            .event_handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self.event_handlers.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Execute the pipeline against the context
    ///
    /// A stage starts only after every earlier stage succeeded. The first
    /// failure, timeout or interrupt aborts the run; nothing is rolled back.
    pub async fn run(&self, pipeline: &mut Pipeline, ctx: &mut PipelineContext) -> RunOutcome {
        let run_id = pipeline.state.run_id;
        let started_at = Utc::now();

        info!("Starting deployment {} ({})", pipeline.name, run_id);
        self.emit_event(ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name: pipeline.name.clone(),
            total_stages: pipeline.len(),
        });
        pipeline.state.start(pipeline.len());

        let mut applied = Vec::new();
        let mut skipped = Vec::new();
        let mut failure = None;

        let stages: Vec<_> = pipeline.slots().iter().map(|slot| slot.stage.clone()).collect();
        for (index, stage) in stages.iter().enumerate() {
            let stage_id = stage.id().to_string();

            if self.interrupted.load(Ordering::SeqCst) {
                warn!("Interrupted, not starting stage {}", stage_id);
                failure = Some((stage_id.clone(), DeployError::Interrupted { stage: stage_id }));
                break;
            }

            let stage_started = Utc::now();
            pipeline.set_state(index, StageState::Running { started_at: stage_started });
            self.emit_event(ExecutionEvent::StageStarted {
                stage_id: stage_id.clone(),
                description: stage.description().to_string(),
            });

            match self.executor.execute(stage.as_ref(), ctx).await {
                Ok(outcome) => {
                    info!("Stage {} succeeded ({:?})", stage_id, outcome);
                    pipeline.set_state(
                        index,
                        StageState::Succeeded {
                            outcome,
                            started_at: stage_started,
                            completed_at: Utc::now(),
                        },
                    );
                    pipeline.state.finished_stages += 1;
                    match outcome {
                        StageOutcome::Applied => applied.push(stage_id.clone()),
                        StageOutcome::AlreadySatisfied => skipped.push(stage_id.clone()),
                    }
                    self.emit_event(ExecutionEvent::StageSucceeded { stage_id, outcome });
                }
                Err(e) => {
                    error!("Stage {} failed: {}", stage_id, e);
                    pipeline.set_state(
                        index,
                        StageState::Failed {
                            error: e.to_string(),
                            started_at: stage_started,
                            failed_at: Utc::now(),
                        },
                    );
                    pipeline.state.finished_stages += 1;
                    self.emit_event(ExecutionEvent::StageFailed {
                        stage_id: stage_id.clone(),
                        error: e.to_string(),
                    });
                    failure = Some((stage_id, e));
                    break;
                }
            }
        }

        let (aborted, error) = match failure {
            Some((stage, cause)) => {
                pipeline.state.abort();
                let info = AbortInfo {
                    stage: stage.clone(),
                    reason: cause.to_string(),
                };
                let error = match cause {
                    interrupted @ DeployError::Interrupted { .. } => interrupted,
                    other => DeployError::StageAborted {
                        stage,
                        source: Box::new(other),
                    },
                };
                (Some(info), Some(error))
            }
            None => {
                pipeline.state.complete();
                (None, None)
            }
        };

        let status = pipeline.state.status;
        info!("Deployment {} finished: {:?}", pipeline.name, status);
        self.emit_event(ExecutionEvent::PipelineFinished { run_id, status });

        RunOutcome {
            report: RunReport {
                run_id,
                status,
                applied,
                skipped,
                aborted,
                started_at,
                completed_at: pipeline.state.completed_at.unwrap_or_else(Utc::now),
            },
            error,
        }
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}
