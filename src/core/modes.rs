//! Deployment modes and the validator that normalizes them
//!
//! Raw mode strings are converted here and nowhere else. Everything
//! downstream branches on the typed enums.

use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How workloads authenticate to object storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialStrategy {
    /// Literal storage account key stored in a secret
    SharedKey,
    /// Workload identity federation, no literal secret
    FederatedIdentity,
}

/// Where backend and workflow images are pulled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrySource {
    /// Upstream public registry, authenticated with an API key pull secret
    PublicUpstream,
    /// Private mirror attached to the cluster, no pull secret
    PrivateMirror,
}

/// How training workloads treat existing checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckpointStrategy {
    Fresh,
    WarmStart,
    Resume,
}

/// The three orthogonal mode enumerations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeKind {
    Credential,
    Registry,
    Checkpoint,
}

impl ModeKind {
    /// Human readable name used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            ModeKind::Credential => "credential strategy",
            ModeKind::Registry => "registry source",
            ModeKind::Checkpoint => "checkpoint strategy",
        }
    }

    /// Configuration key the raw value is resolved from
    pub fn config_key(&self) -> &'static str {
        match self {
            ModeKind::Credential => "mode.credential_strategy",
            ModeKind::Registry => "mode.registry_source",
            ModeKind::Checkpoint => "mode.checkpoint_strategy",
        }
    }

    /// Canonical spellings accepted for this mode
    pub fn allowed(&self) -> Vec<&'static str> {
        match self {
            ModeKind::Credential => vec!["shared-key", "federated-identity"],
            ModeKind::Registry => vec!["public-upstream", "private-mirror"],
            ModeKind::Checkpoint => vec!["fresh", "warm-start", "resume"],
        }
    }

    /// Rank used to order mode-conditional document transforms
    pub fn priority(&self) -> u8 {
        match self {
            ModeKind::Credential => 0,
            ModeKind::Registry => 1,
            ModeKind::Checkpoint => 2,
        }
    }
}

/// A validated mode value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizedMode {
    Credential(CredentialStrategy),
    Registry(RegistrySource),
    Checkpoint(CheckpointStrategy),
}

impl NormalizedMode {
    pub fn kind(&self) -> ModeKind {
        match self {
            NormalizedMode::Credential(_) => ModeKind::Credential,
            NormalizedMode::Registry(_) => ModeKind::Registry,
            NormalizedMode::Checkpoint(_) => ModeKind::Checkpoint,
        }
    }

    /// Canonical spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizedMode::Credential(CredentialStrategy::SharedKey) => "shared-key",
            NormalizedMode::Credential(CredentialStrategy::FederatedIdentity) => {
                "federated-identity"
            }
            NormalizedMode::Registry(RegistrySource::PublicUpstream) => "public-upstream",
            NormalizedMode::Registry(RegistrySource::PrivateMirror) => "private-mirror",
            NormalizedMode::Checkpoint(CheckpointStrategy::Fresh) => "fresh",
            NormalizedMode::Checkpoint(CheckpointStrategy::WarmStart) => "warm-start",
            NormalizedMode::Checkpoint(CheckpointStrategy::Resume) => "resume",
        }
    }
}

impl fmt::Display for NormalizedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deprecated spellings and the canonical value they stand for
const LEGACY_ALIASES: &[(ModeKind, &str, NormalizedMode)] = &[(
    ModeKind::Checkpoint,
    "none",
    NormalizedMode::Checkpoint(CheckpointStrategy::Fresh),
)];

/// Validate and normalize a raw mode value
///
/// Values are trimmed, lower-cased and underscores are read as hyphens
/// before matching. Unknown values fail with the list of allowed spellings.
pub fn validate(kind: ModeKind, raw: &str) -> Result<NormalizedMode, DeployError> {
    use NormalizedMode::{Checkpoint, Credential, Registry};

    let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");

    let canonical = match (kind, normalized.as_str()) {
        (ModeKind::Credential, "shared-key") => Some(Credential(CredentialStrategy::SharedKey)),
        (ModeKind::Credential, "federated-identity") => {
            Some(Credential(CredentialStrategy::FederatedIdentity))
        }
        (ModeKind::Registry, "public-upstream") => Some(Registry(RegistrySource::PublicUpstream)),
        (ModeKind::Registry, "private-mirror") => Some(Registry(RegistrySource::PrivateMirror)),
        (ModeKind::Checkpoint, "fresh") => Some(Checkpoint(CheckpointStrategy::Fresh)),
        (ModeKind::Checkpoint, "warm-start") => Some(Checkpoint(CheckpointStrategy::WarmStart)),
        (ModeKind::Checkpoint, "resume") => Some(Checkpoint(CheckpointStrategy::Resume)),
        _ => None,
    };

    if let Some(mode) = canonical {
        return Ok(mode);
    }

    if let Some((_, alias, mode)) = LEGACY_ALIASES
        .iter()
        .find(|(alias_kind, alias, _)| *alias_kind == kind && *alias == normalized)
    {
        tracing::warn!(
            "{} '{}' is deprecated, using '{}'",
            kind.label(),
            alias,
            mode
        );
        return Ok(*mode);
    }

    Err(invalid(kind, raw))
}

fn invalid(kind: ModeKind, raw: &str) -> DeployError {
    DeployError::InvalidMode {
        mode: kind.label().to_string(),
        value: raw.to_string(),
        allowed: kind.allowed(),
    }
}

pub fn parse_credential_strategy(raw: &str) -> Result<CredentialStrategy, DeployError> {
    match validate(ModeKind::Credential, raw)? {
        NormalizedMode::Credential(strategy) => Ok(strategy),
        _ => Err(invalid(ModeKind::Credential, raw)),
    }
}

pub fn parse_registry_source(raw: &str) -> Result<RegistrySource, DeployError> {
    match validate(ModeKind::Registry, raw)? {
        NormalizedMode::Registry(source) => Ok(source),
        _ => Err(invalid(ModeKind::Registry, raw)),
    }
}

pub fn parse_checkpoint_strategy(raw: &str) -> Result<CheckpointStrategy, DeployError> {
    match validate(ModeKind::Checkpoint, raw)? {
        NormalizedMode::Checkpoint(strategy) => Ok(strategy),
        _ => Err(invalid(ModeKind::Checkpoint, raw)),
    }
}

/// The active value of every mode enumeration for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentModes {
    pub credential: CredentialStrategy,
    pub registry: RegistrySource,
    pub checkpoint: CheckpointStrategy,
}

impl DeploymentModes {
    pub fn new(
        credential: CredentialStrategy,
        registry: RegistrySource,
        checkpoint: CheckpointStrategy,
    ) -> Self {
        Self {
            credential,
            registry,
            checkpoint,
        }
    }

    /// Validate the three raw values, failing on the first invalid one
    pub fn from_raw(
        credential: &str,
        registry: &str,
        checkpoint: &str,
    ) -> Result<Self, DeployError> {
        Ok(Self {
            credential: parse_credential_strategy(credential)?,
            registry: parse_registry_source(registry)?,
            checkpoint: parse_checkpoint_strategy(checkpoint)?,
        })
    }

    /// Whether the given mode value is the active one for its enumeration
    pub fn is_active(&self, mode: NormalizedMode) -> bool {
        match mode {
            NormalizedMode::Credential(c) => self.credential == c,
            NormalizedMode::Registry(r) => self.registry == r,
            NormalizedMode::Checkpoint(c) => self.checkpoint == c,
        }
    }

    /// Active values in transform priority order
    pub fn active(&self) -> [NormalizedMode; 3] {
        [
            NormalizedMode::Credential(self.credential),
            NormalizedMode::Registry(self.registry),
            NormalizedMode::Checkpoint(self.checkpoint),
        ]
    }
}

impl Default for DeploymentModes {
    fn default() -> Self {
        Self {
            credential: CredentialStrategy::FederatedIdentity,
            registry: RegistrySource::PublicUpstream,
            checkpoint: CheckpointStrategy::Fresh,
        }
    }
}

impl fmt::Display for DeploymentModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [credential, registry, checkpoint] = self.active();
        write!(f, "{}, {}, {}", credential, registry, checkpoint)
    }
}
