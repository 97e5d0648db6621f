//! Test: Credential Rotation - existing secrets are reused unless rotation is forced

use crate::helpers::*;
use deploy_pipeline::core::credential::REVISION_ANNOTATION;

#[tokio::test]
async fn test_existing_token_secret_is_reused() {
    let mut harness = Harness::new();
    harness.cluster = harness
        .cluster
        .clone()
        .with_namespace("osmo-operator")
        .with_secret("backend-service-token", "osmo-operator");
    let mut ctx = context(&[]);

    let report = harness.run(&mut ctx, false).await.1.into_result().unwrap();

    assert!(report.skipped.contains(&"credentials".to_string()));
    assert_eq!(harness.count(is_token), 0);
    assert_eq!(ctx.discovered("token.secret"), Some("backend-service-token"));

    // the seeded secret is untouched
    let secret = harness.cluster.secret("backend-service-token", "osmo-operator").unwrap();
    assert!(secret.entries.is_empty());
}

#[tokio::test]
async fn test_force_rotate_reissues_token() {
    let harness = Harness::new();
    harness.run(&mut context(&[]), false).await.1.into_result().unwrap();
    let first = harness.cluster.secret("backend-service-token", "osmo-operator").unwrap();

    let mut ctx = context(&[]);
    let report = harness.run(&mut ctx, true).await.1.into_result().unwrap();

    assert!(report.applied.contains(&"credentials".to_string()));
    assert!(report.applied.contains(&"registry-auth".to_string()));
    assert_eq!(harness.count(is_token), 2);

    let second = harness.cluster.secret("backend-service-token", "osmo-operator").unwrap();
    assert_ne!(
        first.annotations[REVISION_ANNOTATION],
        second.annotations[REVISION_ANNOTATION]
    );
    assert_eq!(second.entries["token"], "dry-run-token-backend-operator");

    let rotated = ctx.credentials.iter().find(|c| c.name == "backend-service-token").unwrap();
    assert!(!rotated.reused);
    assert!(rotated.revision.is_some());
}

#[tokio::test]
async fn test_rotation_uses_explicit_expiry() {
    let harness = Harness::new();
    let mut ctx = context(&[("token.expires_at", "2026-06-30")]);

    harness.run(&mut ctx, false).await.1.into_result().unwrap();

    let secret = harness.cluster.secret("backend-service-token", "osmo-operator").unwrap();
    assert_eq!(
        secret.annotations[deploy_pipeline::adapters::EXPIRY_ANNOTATION],
        "2026-06-30"
    );
}
