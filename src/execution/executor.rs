//! Stage executor - runs one stage under its time limit

use crate::core::{Precondition, PipelineContext, Stage, StageOutcome};
use crate::error::DeployError;
use tokio::time::timeout;
use tracing::{debug, error, info};

/// Drives check, run and verify for a single stage
#[derive(Debug, Clone, Copy, Default)]
pub struct StageExecutor;

impl StageExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Execute a stage, failing with `StageTimeout` when it overruns
    ///
    /// The whole check/run/verify sequence shares one time budget.
    pub async fn execute(
        &self,
        stage: &dyn Stage,
        ctx: &mut PipelineContext,
    ) -> Result<StageOutcome, DeployError> {
        let limit = stage.timeout();
        match timeout(limit, Self::drive(stage, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                error!("Stage {} timed out after {}s", stage.id(), limit.as_secs());
                Err(DeployError::StageTimeout { secs: limit.as_secs() })
            }
        }
    }

    async fn drive(
        stage: &dyn Stage,
        ctx: &mut PipelineContext,
    ) -> Result<StageOutcome, DeployError> {
        let outcome = match stage.check(ctx).await? {
            Precondition::Satisfied => {
                info!("Stage {} already satisfied", stage.id());
                StageOutcome::AlreadySatisfied
            }
            Precondition::Needed => {
                debug!("Stage {} needs to run", stage.id());
                stage.run(ctx).await?;
                StageOutcome::Applied
            }
        };

        stage.verify(ctx).await?;
        Ok(outcome)
    }
}
