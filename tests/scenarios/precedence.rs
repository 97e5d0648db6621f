//! Test: Precedence - explicit beats environment beats state beats default

use crate::helpers::*;
use deploy_pipeline::core::resolver::{EnvSnapshot, ValueSource};
use deploy_pipeline::PipelineContext;

fn source(ctx: &PipelineContext, key: &str) -> (String, ValueSource) {
    let value = ctx.config().get(key).unwrap();
    (value.as_string(), value.source)
}

#[test]
fn test_each_tier_wins_over_the_next() {
    let env = EnvSnapshot::from_pairs([
        ("NGC_API_KEY", "ngc-key"),
        ("AKS_CLUSTER_NAME", "env-cluster"),
        ("AZURE_REGION", "westus3"),
    ]);
    let ctx = prepare(&[("cluster.name", "explicit-cluster")], env).unwrap();

    assert_eq!(
        source(&ctx, "cluster.name"),
        ("explicit-cluster".to_string(), ValueSource::Explicit)
    );
    assert_eq!(source(&ctx, "cluster.region"), ("westus3".to_string(), ValueSource::Environment));
    assert_eq!(
        source(&ctx, "cluster.resource_group"),
        ("rg-gpu".to_string(), ValueSource::InfrastructureState)
    );
    assert_eq!(
        source(&ctx, "namespace.backend"),
        ("osmo-operator".to_string(), ValueSource::Default)
    );
}

#[test]
fn test_empty_environment_value_counts_as_unset() {
    let env = EnvSnapshot::from_pairs([("NGC_API_KEY", "ngc-key"), ("AKS_CLUSTER_NAME", "")]);
    let ctx = prepare(&[], env).unwrap();

    assert_eq!(
        source(&ctx, "cluster.name"),
        ("gpu-aks".to_string(), ValueSource::InfrastructureState)
    );
}

#[test]
fn test_mode_from_environment() {
    let env = EnvSnapshot::from_pairs([
        ("NGC_API_KEY", "ngc-key"),
        ("CREDENTIAL_STRATEGY", "SHARED-KEY"),
    ]);
    let ctx = prepare(&[], env).unwrap();

    assert_eq!(ctx.modes.to_string(), "shared-key, public-upstream, fresh");
    assert_eq!(
        source(&ctx, "storage.key"),
        ("state-key".to_string(), ValueSource::InfrastructureState)
    );
}

#[test]
fn test_sensitive_values_are_masked_for_display() {
    let ctx = context(&[]);
    let described = ctx.describe_config();

    let (_, shown, source) = described
        .iter()
        .find(|(key, _, _)| key == "registry.api_key")
        .unwrap();
    assert_eq!(shown, "********");
    assert_eq!(*source, ValueSource::Environment);
    assert!(described.iter().all(|(_, shown, _)| shown != "ngc-key"));
}
