//! Deploy file configuration from YAML

use crate::core::credential::{ExpiryPolicy, Ttl};
use crate::core::keys;
use crate::core::modes::ModeKind;
use crate::error::DeployError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Top-level deployment configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Deployment name, used in reports and run history
    pub name: String,

    /// Infrastructure state document written by the provisioning step
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    #[serde(default)]
    pub modes: ModeSettings,

    /// Explicit configuration values keyed by dotted key
    #[serde(default)]
    values: BTreeMap<String, YamlValue>,

    #[serde(default)]
    pub token: TokenSettings,

    #[serde(default = "default_releases")]
    pub releases: Vec<ReleaseConfig>,

    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

/// Modes pinned in the deploy file; unset ones come from the environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModeSettings {
    #[serde(default)]
    pub credential_strategy: Option<String>,
    #[serde(default)]
    pub registry_source: Option<String>,
    #[serde(default)]
    pub checkpoint_strategy: Option<String>,
}

/// The control plane service token used by the backend operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    #[serde(default = "default_token_secret")]
    pub secret_name: String,

    #[serde(default = "default_token_name")]
    pub token_name: String,

    #[serde(default = "default_token_roles")]
    pub roles: Vec<String>,

    /// Relative lifetime such as `+1 year`
    #[serde(default)]
    pub ttl: Option<String>,

    /// Absolute expiry date; wins over `ttl`
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            secret_name: default_token_secret(),
            token_name: default_token_name(),
            roles: default_token_roles(),
            ttl: None,
            expires_at: None,
        }
    }
}

impl TokenSettings {
    /// Expiry policy, given an absolute date that may override the file
    pub fn expiry_policy(&self, expires_at: Option<String>) -> Result<ExpiryPolicy, DeployError> {
        if let Some(date) = expires_at {
            return Ok(ExpiryPolicy::Absolute(date));
        }
        match &self.ttl {
            Some(ttl) if ttl.trim().eq_ignore_ascii_case("never") => Ok(ExpiryPolicy::Never),
            Some(ttl) => Ok(ExpiryPolicy::Relative(ttl.parse::<Ttl>()?)),
            None => Ok(ExpiryPolicy::default()),
        }
    }
}

/// A chart release installed by the package stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    pub name: String,
    pub chart: String,

    #[serde(default)]
    pub repo: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    /// Defaults to the backend namespace
    #[serde(default)]
    pub namespace: Option<String>,

    /// Merged over the rendered backend values
    #[serde(default = "empty_object")]
    pub values: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_stage_secs")]
    pub stage_secs: u64,

    #[serde(default = "default_install_secs")]
    pub install_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            stage_secs: default_stage_secs(),
            install_secs: default_install_secs(),
        }
    }
}

fn default_token_secret() -> String {
    "backend-service-token".to_string()
}

fn default_token_name() -> String {
    "backend-operator".to_string()
}

fn default_token_roles() -> Vec<String> {
    vec!["backend".to_string()]
}

fn default_releases() -> Vec<ReleaseConfig> {
    vec![ReleaseConfig {
        name: "backend-operator".to_string(),
        chart: "osmo/backend-operator".to_string(),
        repo: Some("https://helm.ngc.nvidia.com/nvidia/osmo".to_string()),
        version: None,
        namespace: None,
        values: empty_object(),
    }]
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_stage_secs() -> u64 {
    300
}

fn default_install_secs() -> u64 {
    600
}

impl DeployConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: DeployConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// A configuration with every setting at its default
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state_file: None,
            modes: ModeSettings::default(),
            values: BTreeMap::new(),
            token: TokenSettings::default(),
            releases: default_releases(),
            timeouts: TimeoutSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Deployment name must not be empty");
        }

        let mut seen = HashSet::new();
        for release in &self.releases {
            if !seen.insert(&release.name) {
                anyhow::bail!("Duplicate release name: {}", release.name);
            }
            if release.chart.trim().is_empty() {
                anyhow::bail!("Release '{}' has no chart", release.name);
            }
            if !release.values.is_object() {
                anyhow::bail!("Release '{}' values must be a mapping", release.name);
            }
        }

        if self.timeouts.stage_secs == 0 || self.timeouts.install_secs == 0 {
            anyhow::bail!("Timeouts must be positive");
        }

        if self.token.roles.is_empty() {
            anyhow::bail!("Token '{}' needs at least one role", self.token.token_name);
        }
        if let Some(ttl) = &self.token.ttl {
            if !ttl.trim().eq_ignore_ascii_case("never") {
                ttl.parse::<Ttl>()?;
            }
        }

        for (key, value) in &self.values {
            if scalar_to_string(value).is_none() {
                anyhow::bail!("Value '{}' must be a string, number or boolean", key);
            }
        }

        Ok(())
    }

    /// Explicit-tier values contributed by the file
    pub fn explicit_values(&self) -> BTreeMap<String, String> {
        let mut explicit: BTreeMap<String, String> = self
            .values
            .iter()
            .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key.clone(), v)))
            .collect();

        let modes = [
            (ModeKind::Credential, &self.modes.credential_strategy),
            (ModeKind::Registry, &self.modes.registry_source),
            (ModeKind::Checkpoint, &self.modes.checkpoint_strategy),
        ];
        for (kind, value) in modes {
            if let Some(value) = value {
                explicit.insert(kind.config_key().to_string(), value.clone());
            }
        }

        if let Some(date) = &self.token.expires_at {
            explicit.insert(keys::TOKEN_EXPIRES_AT.to_string(), date.clone());
        }

        explicit
    }
}

fn scalar_to_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Bool(b) => Some(b.to_string()),
        YamlValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
