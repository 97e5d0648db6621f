//! Test: Full Deploy - every stage applied on an empty cluster

use crate::helpers::*;
use chrono::NaiveDate;
use deploy_pipeline::adapters::{Mutation, EXPIRY_ANNOTATION};
use deploy_pipeline::core::credential::REVISION_ANNOTATION;
use deploy_pipeline::core::template::DocumentKind;
use deploy_pipeline::PipelineStatus;

#[tokio::test]
async fn test_fresh_cluster_with_default_modes() {
    let harness = Harness::new();
    let mut ctx = context(&[]);

    let (pipeline, outcome) = harness.run(&mut ctx, false).await;
    let report = outcome.into_result().unwrap();

    assert_eq!(report.status, PipelineStatus::Completed);
    assert_eq!(
        report.applied,
        vec![
            "namespaces",
            "registry-auth",
            "credentials",
            "install-packages",
            "configure-control-plane"
        ]
    );
    assert!(report.skipped.is_empty());
    assert!(pipeline.is_complete());

    let kinds: Vec<&str> = harness
        .mutations()
        .iter()
        .map(|m| match m {
            Mutation::Namespace { .. } => "namespace",
            Mutation::Secret { .. } => "secret",
            Mutation::Token { .. } => "token",
            Mutation::Release { .. } => "release",
            Mutation::Config { .. } => "config",
            Mutation::DefaultProfile { .. } => "profile",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "namespace",
            "namespace",
            "secret",
            "secret",
            "token",
            "secret",
            "release",
            "config",
            "config",
            "config",
            "profile"
        ]
    );
}

#[tokio::test]
async fn test_token_secret_carries_expiry_and_revision() {
    let harness = Harness::new();
    let mut ctx = context(&[]);
    harness.run(&mut ctx, false).await.1.into_result().unwrap();

    let secret = harness.cluster.secret("backend-service-token", "osmo-operator").unwrap();
    assert_eq!(secret.entries["token"], "dry-run-token-backend-operator");
    assert_eq!(secret.annotations[EXPIRY_ANNOTATION], "2027-03-15");
    assert!(secret.annotations.contains_key(REVISION_ANNOTATION));

    let tokens: Vec<Mutation> = harness.mutations().into_iter().filter(is_token).collect();
    let expected = NaiveDate::from_ymd_opt(2027, 3, 15);
    assert!(matches!(
        &tokens[..],
        [Mutation::Token { name, expires_on, .. }]
            if name == "backend-operator" && *expires_on == expected
    ));
}

#[tokio::test]
async fn test_documents_reference_discovered_secrets() {
    let harness = Harness::new();
    let mut ctx = context(&[]);
    harness.run(&mut ctx, false).await.1.into_result().unwrap();

    let release = harness
        .mutations()
        .into_iter()
        .find_map(|m| match m {
            Mutation::Release { values, namespace, .. } => Some((values, namespace)),
            _ => None,
        })
        .unwrap();
    assert_eq!(release.1, "osmo-operator");
    assert_eq!(release.0["global"]["accountTokenSecret"], "backend-service-token");
    assert_eq!(release.0["global"]["imagePullSecret"], "registry-credentials");
    assert_eq!(release.0["global"]["serviceUrl"], "https://osmo.example.com");

    let documents = harness.control_plane.documents();
    let storage = &documents[&("WORKFLOW".to_string(), "storage".to_string())];
    assert!(storage["workflow_data"]["credential"].get("access_key").is_none());
    assert_eq!(storage["workflow_data"]["credential"]["client_id"], "11111111-2222");

    let pod_template = &documents[&("POD_TEMPLATE".to_string(), "gpu-workload".to_string())];
    assert_eq!(pod_template["spec"]["imagePullSecrets"][0]["name"], "registry-credentials");
    assert!(pod_template["spec"].get("volumes").is_none());

    assert!(documents.contains_key(&("POOL".to_string(), "default".to_string())));

    let kinds: Vec<DocumentKind> = ctx.documents.iter().map(|d| d.kind).collect();
    assert_eq!(
        kinds,
        vec![
            DocumentKind::BackendValues,
            DocumentKind::WorkflowStorage,
            DocumentKind::PodTemplate,
            DocumentKind::BackendPool,
        ]
    );
}
