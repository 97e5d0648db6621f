//! Core domain models for the deployment pipeline
//!
//! Configuration resolution, deployment modes, credentials, document
//! rendering and the stage chain that ties them together.

pub mod config;
pub mod context;
pub mod credential;
pub mod documents;
pub mod keys;
pub mod modes;
pub mod pipeline;
pub mod resolver;
pub mod stage;
pub mod state;
pub mod state_reader;
pub mod template;

pub use context::*;
pub use pipeline::*;
pub use stage::*;
pub use state::*;
