//! deploy-pipeline - idempotent staged deployment of a GPU workflow backend

pub mod adapters;
pub mod cli;
pub mod core;
pub mod deploy;
pub mod error;
pub mod execution;
pub mod persistence;
pub mod stages;

// Re-export commonly used types
pub use core::config::DeployConfig;
pub use core::modes::{CheckpointStrategy, CredentialStrategy, DeploymentModes, RegistrySource};
pub use core::{Pipeline, PipelineContext, PipelineStatus, RunReport, Stage, StageOutcome};
pub use error::DeployError;
pub use execution::{ExecutionEngine, ExecutionEvent, RunOutcome};
pub use stages::{standard_pipeline, Adapters, StageOptions};
