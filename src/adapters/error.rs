//! Adapter error types

use thiserror::Error;

/// Error raised by an external tool adapter
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("failed to spawn {tool}: {reason}")]
    Spawn { tool: String, reason: String },

    #[error("{tool} exited with code {code}: {stderr}")]
    Exit {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("{tool} timed out after {secs} seconds")]
    Timeout { tool: String, secs: u64 },

    #[error("could not decode {tool} output: {reason}")]
    Decode { tool: String, reason: String },
}

impl AdapterError {
    /// Whether the tool reported that the object it was asked to create already exists
    pub fn is_already_exists(&self) -> bool {
        match self {
            AdapterError::Exit { stderr, .. } => {
                stderr.contains("AlreadyExists") || stderr.contains("already exists")
            }
            _ => false,
        }
    }
}
