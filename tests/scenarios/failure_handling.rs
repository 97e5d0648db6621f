//! Test: Failure Handling - the first failure stops the chain

use crate::helpers::*;
use deploy_pipeline::adapters::AdapterError;
use deploy_pipeline::core::resolver::EnvSnapshot;
use deploy_pipeline::{DeployError, PipelineStatus};

#[tokio::test]
async fn test_install_failure_leaves_later_stages_pending() {
    let harness = Harness::new().with_installer(FailingInstaller);
    let mut ctx = context(&[]);

    let (pipeline, outcome) = harness.run(&mut ctx, false).await;

    assert_eq!(outcome.report.status, PipelineStatus::Aborted);
    assert!(pipeline.is_aborted());
    assert_stage_states(
        &pipeline,
        &[
            ("namespaces", "succeeded"),
            ("registry-auth", "succeeded"),
            ("credentials", "succeeded"),
            ("install-packages", "failed"),
            ("configure-control-plane", "pending"),
        ],
    );
    assert_eq!(outcome.report.aborted.as_ref().unwrap().stage, "install-packages");
    assert_eq!(harness.count(is_config), 0);

    match outcome.error.unwrap() {
        DeployError::StageAborted { stage, source } => {
            assert_eq!(stage, "install-packages");
            match *source {
                DeployError::ExternalAdapterFailure {
                    source: AdapterError::Exit { tool, code, .. },
                    ..
                } => {
                    assert_eq!(tool, "helm");
                    assert_eq!(code, 1);
                }
                other => panic!("Expected ExternalAdapterFailure, got {:?}", other),
            }
        }
        other => panic!("Expected StageAborted, got {:?}", other),
    }
}

#[test]
fn test_bad_token_expiry_fails_before_any_stage() {
    for raw in ["31/12/2027", "2020-01-01", "2026-10-15T23:00:00Z"] {
        match prepare(&[("token.expires_at", raw)], operator_env()) {
            Err(DeployError::InvalidExpiry { value, .. }) => assert_eq!(value, raw),
            Err(other) => panic!("Expected InvalidExpiry for {}, got {:?}", raw, other),
            Ok(_) => panic!("{} was accepted as a token expiry", raw),
        }
    }
}

#[tokio::test]
async fn test_expiry_passing_after_preparation_still_stops_the_token() {
    // valid on the day the context was prepared, past on the day the stage runs
    let mut ctx = context(&[("token.expires_at", "2026-03-20")]);
    let harness = Harness::new();
    let config = deploy_pipeline::DeployConfig::named("gpu-backend");
    let options = deploy_pipeline::StageOptions {
        force_rotate: false,
        today: chrono::NaiveDate::from_ymd_opt(2026, 4, 1),
    };
    let adapters = harness.adapters();
    let mut pipeline = deploy_pipeline::standard_pipeline(&config, &adapters, &options);

    let outcome = deploy_pipeline::ExecutionEngine::new()
        .run(&mut pipeline, &mut ctx)
        .await;

    assert_stage_states(&pipeline, &[("credentials", "failed"), ("install-packages", "pending")]);
    assert_eq!(harness.count(is_token), 0);
    match outcome.error.unwrap() {
        DeployError::StageAborted { stage, source } => {
            assert_eq!(stage, "credentials");
            assert!(matches!(*source, DeployError::InvalidExpiry { .. }));
        }
        other => panic!("Expected StageAborted, got {:?}", other),
    }
}

#[test]
fn test_missing_api_key_fails_before_any_stage() {
    let err = prepare(&[], EnvSnapshot::default()).unwrap_err();
    match err {
        DeployError::MissingRequiredConfig { key, description } => {
            assert_eq!(key, "registry.api_key");
            assert!(description.contains("$NGC_API_KEY"));
        }
        other => panic!("Expected MissingRequiredConfig, got {:?}", other),
    }
}

#[test]
fn test_unknown_mode_lists_allowed_values() {
    let err = prepare(&[("mode.registry_source", "dockerhub")], operator_env()).unwrap_err();
    match err {
        DeployError::InvalidMode { value, allowed, .. } => {
            assert_eq!(value, "dockerhub");
            assert!(allowed.contains(&"private-mirror"));
        }
        other => panic!("Expected InvalidMode, got {:?}", other),
    }
}

#[test]
fn test_missing_state_file_is_reported() {
    let overrides = std::collections::BTreeMap::new();
    let missing = std::path::Path::new("/nonexistent/outputs.json");
    let err = deploy_pipeline::deploy::prepare(
        &deploy_pipeline::DeployConfig::named("gpu-backend"),
        &overrides,
        operator_env(),
        Some(missing),
    )
    .unwrap_err();
    assert!(matches!(err, DeployError::StateUnavailable { .. }));
}
