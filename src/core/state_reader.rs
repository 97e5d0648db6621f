//! Infrastructure state reader
//!
//! Reads the JSON output document written by the upstream provisioning
//! step (`terraform output -json` shape, e.g. `aks_cluster.value.name`).
//! The document is re-read on every run and never cached.

use crate::error::DeployError;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// A loaded infrastructure state document
#[derive(Debug, Clone)]
pub struct InfraState {
    location: String,
    root: Value,
}

impl InfraState {
    /// Load the state document from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DeployError> {
        let location = path.as_ref().display().to_string();
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| DeployError::StateUnavailable {
                location: location.clone(),
                reason: e.to_string(),
            })?;

        let state = Self::from_json(&location, &content)?;
        debug!("Loaded infrastructure state from {}", location);
        Ok(state)
    }

    /// Parse a state document from a JSON string
    pub fn from_json(location: &str, content: &str) -> Result<Self, DeployError> {
        let root: Value = serde_json::from_str(content).map_err(|e| DeployError::StateUnavailable {
            location: location.to_string(),
            reason: format!("malformed JSON: {}", e),
        })?;

        if !root.is_object() {
            return Err(DeployError::StateUnavailable {
                location: location.to_string(),
                reason: "top level is not an object".to_string(),
            });
        }

        Ok(Self {
            location: location.to_string(),
            root,
        })
    }

    /// Where the document was loaded from
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Look up a dotted path; arrays are indexed by number
    pub fn lookup(&self, dotted_path: &str) -> Option<&Value> {
        dotted_path
            .split('.')
            .try_fold(&self.root, |node, segment| match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
            .filter(|value| !value.is_null())
    }

    /// Look up a path that must be present
    pub fn get(&self, dotted_path: &str, description: &str) -> Result<&Value, DeployError> {
        self.lookup(dotted_path).ok_or_else(|| DeployError::RequiredOutputMissing {
            path: dotted_path.to_string(),
            description: description.to_string(),
        })
    }

    /// Look up a path, yielding the default when absent
    pub fn get_or(&self, dotted_path: &str, default: Value) -> Value {
        self.lookup(dotted_path).cloned().unwrap_or(default)
    }
}
