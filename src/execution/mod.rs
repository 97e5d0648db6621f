//! Pipeline execution engine

pub mod engine;
pub mod executor;

pub use engine::{watch_interrupts, EventHandler, ExecutionEngine, ExecutionEvent, RunOutcome};
pub use executor::StageExecutor;
