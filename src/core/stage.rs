//! Stage abstraction

use crate::core::context::PipelineContext;
use crate::error::DeployError;
use async_trait::async_trait;
use std::time::Duration;

/// Default wall-clock bound for one stage
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of a stage's precondition check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Nothing to do; `run` is skipped
    Satisfied,
    /// `run` must be called
    Needed,
}

/// One step of the deployment chain
///
/// `check` must not mutate anything outside the context. A stage whose
/// check reports [`Precondition::Satisfied`] still has `verify` called.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable identifier used in reports and history
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    fn timeout(&self) -> Duration {
        DEFAULT_STAGE_TIMEOUT
    }

    async fn check(&self, ctx: &mut PipelineContext) -> Result<Precondition, DeployError>;

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), DeployError>;

    /// Postcondition checked after `run` or a satisfied `check`
    async fn verify(&self, _ctx: &PipelineContext) -> Result<(), DeployError> {
        Ok(())
    }
}
