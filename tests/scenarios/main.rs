//! Scenario-based tests for deploy-pipeline

mod helpers;

mod credential_rotation;
mod failure_handling;
mod full_deploy;
mod mode_matrix;
mod precedence;
mod rerun_idempotency;
