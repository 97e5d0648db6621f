//! CLI command definitions

use crate::core::keys;
use crate::core::modes::ModeKind;
use crate::core::template::DocumentKind;
use clap::Args;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Flags shared by every command that resolves configuration
#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    /// Path to the deploy YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Explicit value overrides (key=value)
    #[arg(long = "set", value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,

    /// Infrastructure state JSON; overrides the deploy file's state_file
    #[arg(long)]
    pub state: Option<PathBuf>,

    #[arg(long)]
    pub credential_strategy: Option<String>,

    #[arg(long)]
    pub registry_source: Option<String>,

    #[arg(long)]
    pub checkpoint_strategy: Option<String>,

    /// Absolute expiry date of the service token (YYYY-MM-DD)
    #[arg(long)]
    pub token_expiry: Option<String>,
}

impl ResolveArgs {
    /// Explicit-tier values given on the command line
    pub fn overrides(&self) -> BTreeMap<String, String> {
        let mut overrides: BTreeMap<String, String> = self.set.iter().cloned().collect();

        let modes = [
            (ModeKind::Credential, &self.credential_strategy),
            (ModeKind::Registry, &self.registry_source),
            (ModeKind::Checkpoint, &self.checkpoint_strategy),
        ];
        for (kind, value) in modes {
            if let Some(value) = value {
                overrides.insert(kind.config_key().to_string(), value.clone());
            }
        }
        if let Some(date) = &self.token_expiry {
            overrides.insert(keys::TOKEN_EXPIRES_AT.to_string(), date.clone());
        }

        overrides
    }

    /// State file to read; a path from the deploy file is relative to it
    pub fn state_path(&self, from_file: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = &self.state {
            return Some(path.clone());
        }
        from_file.map(|path| match self.file.parent() {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        })
    }
}

/// Run the deployment
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    #[command(flatten)]
    pub resolve: ResolveArgs,

    /// Regenerate credentials even when they exist
    #[arg(long)]
    pub force_rotate: bool,

    /// Record mutations instead of performing them
    #[arg(long)]
    pub dry_run: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Context of the target cluster
    #[arg(long)]
    pub kube_context: Option<String>,
}

/// Resolve configuration and modes without deploying
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    #[command(flatten)]
    pub resolve: ResolveArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Print the rendered configuration documents
#[derive(Debug, Args, Clone)]
pub struct RenderCommand {
    #[command(flatten)]
    pub resolve: ResolveArgs,

    /// Only print documents of this kind
    #[arg(long, value_parser = parse_document_kind)]
    pub kind: Option<DocumentKind>,

    /// Output in JSON format instead of YAML
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Deployment name to filter by
    #[arg(short, long)]
    pub deployment: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show a single run
    #[arg(long)]
    pub run_id: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}

fn parse_document_kind(s: &str) -> Result<DocumentKind, String> {
    let kinds = [
        DocumentKind::WorkflowStorage,
        DocumentKind::BackendPool,
        DocumentKind::PodTemplate,
        DocumentKind::BackendValues,
    ];
    kinds.into_iter().find(|k| k.as_str() == s).ok_or_else(|| {
        let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        format!("unknown document kind '{}' (expected one of {})", s, names.join(", "))
    })
}
