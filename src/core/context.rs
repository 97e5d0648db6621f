//! Pipeline context - resolved configuration and what stages discover

use crate::core::credential::CredentialRef;
use crate::core::modes::DeploymentModes;
use crate::core::resolver::{ResolvedConfig, ValueSource};
use crate::core::template::{ConfigDocument, Substitutions};
use crate::error::DeployError;
use serde_json::Value;
use std::collections::BTreeMap;

const REDACTED: &str = "********";

/// State shared by the stages of one run
///
/// Created after configuration resolution succeeded; discarded when the
/// run ends.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub deployment: String,
    pub modes: DeploymentModes,
    config: ResolvedConfig,

    /// Identifiers produced by earlier stages (e.g. the token secret name)
    discovered: BTreeMap<String, String>,

    /// Documents rendered during this run
    pub documents: Vec<ConfigDocument>,

    /// Credentials ensured during this run
    pub credentials: Vec<CredentialRef>,
}

impl PipelineContext {
    pub fn new(
        deployment: impl Into<String>,
        config: ResolvedConfig,
        modes: DeploymentModes,
    ) -> Self {
        Self {
            deployment: deployment.into(),
            modes,
            config,
            discovered: BTreeMap::new(),
            documents: Vec::new(),
            credentials: Vec::new(),
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// A resolved or discovered value
    pub fn value(&self, key: &str) -> Option<String> {
        self.discovered
            .get(key)
            .cloned()
            .or_else(|| self.config.string(key))
    }

    /// A value the key catalog guaranteed for the active modes
    pub fn require(&self, key: &str) -> Result<String, DeployError> {
        match self.discovered.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.config.require(key),
        }
    }

    /// Record an identifier produced by a stage
    pub fn discover(&mut self, key: &str, value: impl Into<String>) {
        self.discovered.insert(key.to_string(), value.into());
    }

    pub fn discovered(&self, key: &str) -> Option<&str> {
        self.discovered.get(key).map(String::as_str)
    }

    /// Everything a template may reference, keeping resolved scalar types
    pub fn substitutions(&self) -> Substitutions {
        let mut substitutions: Substitutions = self
            .config
            .iter()
            .map(|value| (value.key.clone(), value.value.to_json()))
            .collect();
        for (key, value) in &self.discovered {
            substitutions.insert(key.clone(), Value::String(value.clone()));
        }
        substitutions
    }

    /// Resolved values for display, with secrets masked
    pub fn describe_config(&self) -> Vec<(String, String, ValueSource)> {
        self.config
            .iter()
            .map(|value| {
                let shown = if self.config.is_sensitive(&value.key) {
                    REDACTED.to_string()
                } else {
                    value.as_string()
                };
                (value.key.clone(), shown, value.source)
            })
            .collect()
    }
}
