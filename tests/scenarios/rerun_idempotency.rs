//! Test: Rerun Idempotency - a second run creates nothing new

use crate::helpers::*;
use deploy_pipeline::adapters::{InMemoryInstaller, Mutation};
use deploy_pipeline::PipelineStatus;
use std::sync::Arc;

#[tokio::test]
async fn test_second_run_only_reapplies_idempotent_stages() {
    let harness = Harness::new();
    harness.run(&mut context(&[]), false).await.1.into_result().unwrap();
    let first_run = harness.log.len();

    let mut ctx = context(&[]);
    let report = harness.run(&mut ctx, false).await.1.into_result().unwrap();

    assert_eq!(report.skipped, vec!["namespaces", "registry-auth", "credentials"]);
    assert_eq!(report.applied, vec!["install-packages", "configure-control-plane"]);

    let second_run = &harness.mutations()[first_run..];
    assert!(second_run.iter().all(|m| matches!(
        m,
        Mutation::Release { .. } | Mutation::Config { .. } | Mutation::DefaultProfile { .. }
    )));
    assert_eq!(harness.count(is_token), 1);

    // skipped stages still publish what later stages reference
    assert_eq!(ctx.discovered("token.secret"), Some("backend-service-token"));
    assert_eq!(ctx.discovered("registry.pull_secret"), Some("registry-credentials"));
}

#[tokio::test]
async fn test_rerun_after_partial_failure_issues_no_second_token() {
    let mut harness = Harness::new().with_installer(FailingInstaller);
    let (_, outcome) = harness.run(&mut context(&[]), false).await;
    assert_eq!(outcome.report.status, PipelineStatus::Aborted);
    assert_eq!(harness.count(is_token), 1);

    harness.installer = Arc::new(InMemoryInstaller::new(harness.log.clone()));
    let report = harness.run(&mut context(&[]), false).await.1.into_result().unwrap();

    assert!(report.skipped.contains(&"credentials".to_string()));
    assert_eq!(harness.count(is_token), 1);
    assert_eq!(harness.count(is_release), 1);
    assert_eq!(harness.count(is_config), 3);
}
