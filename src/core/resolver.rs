//! Configuration resolver
//!
//! Each key resolves through a fixed precedence chain:
//! explicit operator value, then the environment snapshot taken at
//! pipeline start, then the infrastructure state document. Resolution is
//! pure: the same inputs always yield the same values.

use crate::core::state_reader::InfraState;
use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Immutable copy of the process environment
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Get a variable; empty values count as unset
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// A resolved configuration scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigScalar {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl ConfigScalar {
    /// Convert a state document value; objects and arrays are not scalars
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(ConfigScalar::Bool(*b)),
            Value::Number(n) => Some(ConfigScalar::Number(n.clone())),
            Value::String(s) => Some(ConfigScalar::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ConfigScalar::Bool(b) => Value::Bool(*b),
            ConfigScalar::Number(n) => Value::Number(n.clone()),
            ConfigScalar::String(s) => Value::String(s.clone()),
        }
    }

    /// Interpret as a boolean (`true`/`false`/`1`/`0`/`yes`/`no`)
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigScalar::Bool(b) => Some(*b),
            ConfigScalar::Number(n) => n.as_i64().map(|i| i != 0),
            ConfigScalar::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
        }
    }
}

impl fmt::Display for ConfigScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigScalar::Bool(b) => write!(f, "{}", b),
            ConfigScalar::Number(n) => write!(f, "{}", n),
            ConfigScalar::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ConfigScalar {
    fn from(s: &str) -> Self {
        ConfigScalar::String(s.to_string())
    }
}

/// Which tier produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    Explicit,
    Environment,
    InfrastructureState,
    Default,
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueSource::Explicit => "explicit",
            ValueSource::Environment => "environment",
            ValueSource::InfrastructureState => "infrastructure state",
            ValueSource::Default => "default",
        };
        f.write_str(label)
    }
}

/// A key resolved to a value, tagged with its source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigValue {
    pub key: String,
    pub value: ConfigScalar,
    pub source: ValueSource,
}

impl ConfigValue {
    pub fn as_string(&self) -> String {
        self.value.to_string()
    }
}

/// Where a key can be found and whether it must be found
#[derive(Debug, Clone, PartialEq)]
pub struct KeySpec {
    pub key: String,
    pub description: String,
    pub env_var: Option<String>,
    pub state_path: Option<String>,
    pub required: bool,
    pub default: Option<ConfigScalar>,
    /// Secret values are never echoed in reports
    pub sensitive: bool,
}

impl KeySpec {
    pub fn required(key: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
            env_var: None,
            state_path: None,
            required: true,
            default: None,
            sensitive: false,
        }
    }

    pub fn optional(key: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(key, description)
        }
    }

    pub fn env(mut self, var: &str) -> Self {
        self.env_var = Some(var.to_string());
        self
    }

    pub fn state(mut self, path: &str) -> Self {
        self.state_path = Some(path.to_string());
        self
    }

    pub fn default_value(mut self, value: impl Into<ConfigScalar>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Make the key required, dropping any default
    pub fn require(mut self) -> Self {
        self.required = true;
        self.default = None;
        self
    }
}

/// Resolves keys through explicit, environment and state tiers
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    explicit: BTreeMap<String, String>,
    env: EnvSnapshot,
    state: Option<InfraState>,
}

impl ConfigResolver {
    pub fn new(
        explicit: BTreeMap<String, String>,
        env: EnvSnapshot,
        state: Option<InfraState>,
    ) -> Self {
        Self { explicit, env, state }
    }

    pub fn state(&self) -> Option<&InfraState> {
        self.state.as_ref()
    }

    /// Resolve a key
    ///
    /// Returns `Ok(None)` only for an optional key with no value and no default.
    pub fn resolve(&self, spec: &KeySpec) -> Result<Option<ConfigValue>, DeployError> {
        if let Some(value) = self.explicit.get(&spec.key) {
            return Ok(Some(ConfigValue {
                key: spec.key.clone(),
                value: ConfigScalar::String(value.clone()),
                source: ValueSource::Explicit,
            }));
        }

        if let Some(value) = spec.env_var.as_deref().and_then(|var| self.env.get(var)) {
            return Ok(Some(ConfigValue {
                key: spec.key.clone(),
                value: ConfigScalar::String(value.to_string()),
                source: ValueSource::Environment,
            }));
        }

        if let (Some(state), Some(path)) = (&self.state, &spec.state_path) {
            if let Some(value) = state.lookup(path).and_then(ConfigScalar::from_json) {
                return Ok(Some(ConfigValue {
                    key: spec.key.clone(),
                    value,
                    source: ValueSource::InfrastructureState,
                }));
            }
        }

        if spec.required {
            return Err(DeployError::MissingRequiredConfig {
                key: spec.key.clone(),
                description: describe(spec),
            });
        }

        Ok(spec.default.clone().map(|value| ConfigValue {
            key: spec.key.clone(),
            value,
            source: ValueSource::Default,
        }))
    }

    /// Resolve every key in a catalog, reporting all missing required keys at once
    pub fn resolve_all(&self, catalog: &[KeySpec]) -> Result<ResolvedConfig, DeployError> {
        let mut resolved = ResolvedConfig::default();
        let mut missing = Vec::new();

        for spec in catalog {
            match self.resolve(spec) {
                Ok(Some(value)) => {
                    if spec.sensitive {
                        resolved.sensitive.push(spec.key.clone());
                    }
                    resolved.values.insert(spec.key.clone(), value);
                }
                Ok(None) => {}
                Err(DeployError::MissingRequiredConfig { key, description }) => {
                    missing.push((key, description));
                }
                Err(other) => return Err(other),
            }
        }

        match missing.len() {
            0 => Ok(resolved),
            1 => {
                let (key, description) = missing.remove(0);
                Err(DeployError::MissingRequiredConfig { key, description })
            }
            _ => Err(DeployError::MissingConfiguration { missing }),
        }
    }
}

/// Describe a key including where the operator can supply it
fn describe(spec: &KeySpec) -> String {
    let mut hints = vec!["--set".to_string()];
    if let Some(var) = &spec.env_var {
        hints.push(format!("${}", var));
    }
    if let Some(path) = &spec.state_path {
        hints.push(format!("state '{}'", path));
    }
    format!("{}; set via {}", spec.description, hints.join(", "))
}

/// The resolved configuration of one run
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    values: BTreeMap<String, ConfigValue>,
    sensitive: Vec<String>,
}

impl ResolvedConfig {
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// String form of a key, if resolved
    pub fn string(&self, key: &str) -> Option<String> {
        self.values.get(key).map(ConfigValue::as_string)
    }

    /// String form of a key that the catalog guaranteed
    pub fn require(&self, key: &str) -> Result<String, DeployError> {
        self.string(key).ok_or_else(|| DeployError::MissingRequiredConfig {
            key: key.to_string(),
            description: "not resolved for the active deployment modes".to_string(),
        })
    }

    pub fn insert(&mut self, value: ConfigValue) {
        self.values.insert(value.key.clone(), value);
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        self.sensitive.iter().any(|k| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigValue> {
        self.values.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> InfraState {
        InfraState::from_json(
            "outputs.json",
            r#"{"aks_cluster": {"value": {"name": "from-state", "node_count": 4}}}"#,
        )
        .unwrap()
    }

    fn spec() -> KeySpec {
        KeySpec::required("cluster.name", "cluster name")
            .env("AKS_CLUSTER_NAME")
            .state("aks_cluster.value.name")
    }

    #[test]
    fn test_precedence_law() {
        let explicit = BTreeMap::from([("cluster.name".to_string(), "from-explicit".to_string())]);
        let env = EnvSnapshot::from_pairs([("AKS_CLUSTER_NAME", "from-env")]);

        let all = ConfigResolver::new(explicit, env.clone(), Some(state()));
        let value = all.resolve(&spec()).unwrap().unwrap();
        assert_eq!(value.as_string(), "from-explicit");
        assert_eq!(value.source, ValueSource::Explicit);

        let env_and_state = ConfigResolver::new(BTreeMap::new(), env, Some(state()));
        let value = env_and_state.resolve(&spec()).unwrap().unwrap();
        assert_eq!(value.as_string(), "from-env");
        assert_eq!(value.source, ValueSource::Environment);

        let state_only =
            ConfigResolver::new(BTreeMap::new(), EnvSnapshot::default(), Some(state()));
        let value = state_only.resolve(&spec()).unwrap().unwrap();
        assert_eq!(value.as_string(), "from-state");
        assert_eq!(value.source, ValueSource::InfrastructureState);

        let nothing = ConfigResolver::new(BTreeMap::new(), EnvSnapshot::default(), None);
        let err = nothing.resolve(&spec()).unwrap_err();
        match err {
            DeployError::MissingRequiredConfig { key, description } => {
                assert_eq!(key, "cluster.name");
                assert!(description.starts_with("cluster name"));
                assert!(description.contains("$AKS_CLUSTER_NAME"));
            }
            other => panic!("Expected MissingRequiredConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_env_var_is_unset() {
        let env = EnvSnapshot::from_pairs([("AKS_CLUSTER_NAME", "")]);
        let resolver = ConfigResolver::new(BTreeMap::new(), env, Some(state()));
        let value = resolver.resolve(&spec()).unwrap().unwrap();
        assert_eq!(value.source, ValueSource::InfrastructureState);
    }

    #[test]
    fn test_optional_default() {
        let resolver = ConfigResolver::new(BTreeMap::new(), EnvSnapshot::default(), None);
        let with_default = KeySpec::optional("pool.name", "pool").default_value("default");
        let value = resolver.resolve(&with_default).unwrap().unwrap();
        assert_eq!(value.as_string(), "default");
        assert_eq!(value.source, ValueSource::Default);

        let without_default = KeySpec::optional("checkpoint.path", "resume path");
        assert!(resolver.resolve(&without_default).unwrap().is_none());
    }

    #[test]
    fn test_state_keeps_scalar_type() {
        let resolver = ConfigResolver::new(BTreeMap::new(), EnvSnapshot::default(), Some(state()));
        let spec =
            KeySpec::required("cluster.node_count", "nodes").state("aks_cluster.value.node_count");
        let value = resolver.resolve(&spec).unwrap().unwrap();
        assert_eq!(value.value.to_json(), serde_json::json!(4));
    }

    #[test]
    fn test_resolve_all_reports_every_missing_key() {
        let resolver = ConfigResolver::new(BTreeMap::new(), EnvSnapshot::default(), None);
        let catalog = vec![
            KeySpec::required("a", "first"),
            KeySpec::optional("b", "second").default_value("x"),
            KeySpec::required("c", "third"),
        ];
        match resolver.resolve_all(&catalog).unwrap_err() {
            DeployError::MissingConfiguration { missing } => {
                let keys: Vec<_> = missing.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["a", "c"]);
            }
            other => panic!("Expected MissingConfiguration, got {:?}", other),
        }
    }

    #[test]
    fn test_scalar_as_bool() {
        assert_eq!(ConfigScalar::from("yes").as_bool(), Some(true));
        assert_eq!(ConfigScalar::Bool(false).as_bool(), Some(false));
        assert_eq!(ConfigScalar::from("maybe").as_bool(), None);
    }
}
