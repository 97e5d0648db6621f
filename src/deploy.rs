//! Run preparation: from a deploy file to a ready pipeline context
//!
//! Everything here happens before the first stage starts, so any error
//! returned leaves the cluster and control plane untouched.

use crate::core::config::{DeployConfig, TokenSettings};
use crate::core::documents::backend_values;
use crate::core::keys;
use crate::core::modes::RegistrySource;
use crate::core::resolver::{ConfigResolver, EnvSnapshot};
use crate::core::state_reader::InfraState;
use crate::core::template::{ConfigDocument, TemplateRenderer};
use crate::core::PipelineContext;
use crate::error::DeployError;
use crate::stages::configure::render_targets;
use crate::stages::registry::PULL_SECRET_NAME;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Resolve modes and the full key catalog for a run
///
/// `overrides` join the deploy file's values in the explicit tier and win
/// over them. The state document is read fresh on every call. The token
/// expiry is checked against today's UTC date.
pub fn prepare(
    config: &DeployConfig,
    overrides: &BTreeMap<String, String>,
    env: EnvSnapshot,
    state_path: Option<&Path>,
) -> Result<PipelineContext, DeployError> {
    prepare_on(config, overrides, env, state_path, Utc::now().date_naive())
}

/// [`prepare`] with the date used to validate the token expiry pinned
pub fn prepare_on(
    config: &DeployConfig,
    overrides: &BTreeMap<String, String>,
    env: EnvSnapshot,
    state_path: Option<&Path>,
    today: NaiveDate,
) -> Result<PipelineContext, DeployError> {
    let mut explicit = config.explicit_values();
    explicit.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

    let state = match state_path {
        Some(path) => {
            info!("Reading infrastructure state from {}", path.display());
            Some(InfraState::load(path)?)
        }
        None => None,
    };

    let resolver = ConfigResolver::new(explicit, env, state);
    let modes = keys::resolve_modes(&resolver)?;
    info!("Deployment modes: {}", modes);

    let resolved = resolver.resolve_all(&keys::catalog(&modes))?;
    for value in resolved.iter() {
        debug!("{} resolved from {:?}", value.key, value.source);
    }

    let ctx = PipelineContext::new(config.name.clone(), resolved, modes);

    // a bad expiry must fail before the first stage touches the cluster
    let expiry = config.token.expiry_policy(ctx.value(keys::TOKEN_EXPIRES_AT))?;
    if let Some(date) = expiry.resolve(today)? {
        debug!("Token {} would expire on {}", config.token.token_name, date);
    }

    Ok(ctx)
}

/// Render every document a run would produce, without any adapter
///
/// Identifiers normally discovered by the credential stages are filled in
/// with the names those stages would write.
pub fn render_documents(
    ctx: &mut PipelineContext,
    token: &TokenSettings,
) -> Result<Vec<ConfigDocument>, DeployError> {
    ctx.discover(keys::TOKEN_SECRET, token.secret_name.clone());
    if ctx.modes.registry == RegistrySource::PublicUpstream {
        ctx.discover(keys::PULL_SECRET, PULL_SECRET_NAME);
    }

    let substitutions = ctx.substitutions();
    let renderer = TemplateRenderer::new(&substitutions, &ctx.modes);
    let mut documents = vec![renderer.render(&backend_values())?];
    documents.extend(render_targets(ctx)?.into_iter().map(|(_, _, document)| document));
    Ok(documents)
}
