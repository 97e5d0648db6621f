//! In-memory adapters that record mutations instead of performing them
//!
//! Used by `run --dry-run` and by the tests. All three adapters can share
//! one [`MutationLog`] so the recorded order matches the pipeline order.

use crate::adapters::{
    AdapterError, ClusterApi, ControlPlane, PackageInstaller, ReleaseRequest, SecretKind,
    SecretSpec, TokenRequest,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// One recorded mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Namespace {
        name: String,
    },
    Secret {
        name: String,
        namespace: String,
        kind: SecretKind,
        keys: Vec<String>,
    },
    Release {
        name: String,
        chart: String,
        namespace: String,
        values: Value,
    },
    Token {
        name: String,
        roles: Vec<String>,
        expires_on: Option<NaiveDate>,
    },
    Config {
        section: String,
        key: String,
        document: Value,
    },
    DefaultProfile {
        kind: String,
        key: String,
    },
}

impl Mutation {
    /// Short operator-facing description
    pub fn describe(&self) -> String {
        match self {
            Mutation::Namespace { name } => format!("create namespace {}", name),
            Mutation::Secret { name, namespace, keys, .. } => {
                format!("write secret {}/{} ({})", namespace, name, keys.join(", "))
            }
            Mutation::Release { name, chart, namespace, .. } => {
                format!("install release {} from {} into {}", name, chart, namespace)
            }
            Mutation::Token { name, roles, expires_on } => {
                let roles = roles.join(", ");
                match expires_on {
                    Some(date) => format!("issue token {} [{}] expiring {}", name, roles, date),
                    None => format!("issue token {} [{}]", name, roles),
                }
            }
            Mutation::Config { section, key, .. } => format!("update config {} {}", section, key),
            Mutation::DefaultProfile { kind, key } => format!("set default {} to {}", kind, key),
        }
    }
}

/// Shared, ordered record of mutations
#[derive(Debug, Clone, Default)]
pub struct MutationLog {
    entries: Arc<Mutex<Vec<Mutation>>>,
}

impl MutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Mutation>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, mutation: Mutation) {
        self.lock().push(mutation);
    }

    pub fn entries(&self) -> Vec<Mutation> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[derive(Debug, Default)]
struct ClusterObjects {
    namespaces: BTreeSet<String>,
    secrets: BTreeMap<(String, String), SecretSpec>,
}

/// Cluster that keeps namespaces and secrets in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCluster {
    objects: Arc<Mutex<ClusterObjects>>,
    log: MutationLog,
}

impl InMemoryCluster {
    pub fn new(log: MutationLog) -> Self {
        Self {
            objects: Arc::default(),
            log,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClusterObjects> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed a namespace that already exists before the run
    pub fn with_namespace(self, name: &str) -> Self {
        self.lock().namespaces.insert(name.to_string());
        self
    }

    /// Seed a secret that already exists before the run
    pub fn with_secret(self, name: &str, namespace: &str) -> Self {
        self.lock().secrets.insert(
            (namespace.to_string(), name.to_string()),
            SecretSpec {
                name: name.to_string(),
                namespace: namespace.to_string(),
                kind: SecretKind::Opaque,
                entries: BTreeMap::new(),
                annotations: BTreeMap::new(),
            },
        );
        self
    }

    /// Current content of a secret
    pub fn secret(&self, name: &str, namespace: &str) -> Option<SecretSpec> {
        self.lock()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.lock().namespaces.iter().cloned().collect()
    }

    pub fn log(&self) -> &MutationLog {
        &self.log
    }
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    async fn namespace_exists(&self, name: &str) -> Result<bool, AdapterError> {
        Ok(self.lock().namespaces.contains(name))
    }

    async fn apply_namespace(&self, name: &str) -> Result<(), AdapterError> {
        if self.lock().namespaces.insert(name.to_string()) {
            self.log.record(Mutation::Namespace { name: name.to_string() });
        }
        Ok(())
    }

    async fn secret_exists(&self, name: &str, namespace: &str) -> Result<bool, AdapterError> {
        Ok(self
            .lock()
            .secrets
            .contains_key(&(namespace.to_string(), name.to_string())))
    }

    async fn apply_secret(&self, secret: &SecretSpec) -> Result<(), AdapterError> {
        self.lock().secrets.insert(
            (secret.namespace.clone(), secret.name.clone()),
            secret.clone(),
        );
        self.log.record(Mutation::Secret {
            name: secret.name.clone(),
            namespace: secret.namespace.clone(),
            kind: secret.kind,
            keys: secret.entries.keys().cloned().collect(),
        });
        Ok(())
    }
}

/// Installer that records releases without installing them
#[derive(Debug, Clone, Default)]
pub struct InMemoryInstaller {
    log: MutationLog,
}

impl InMemoryInstaller {
    pub fn new(log: MutationLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl PackageInstaller for InMemoryInstaller {
    async fn install_or_upgrade(&self, release: &ReleaseRequest) -> Result<(), AdapterError> {
        self.log.record(Mutation::Release {
            name: release.name.clone(),
            chart: release.chart.clone(),
            namespace: release.namespace.clone(),
            values: release.values.clone(),
        });
        Ok(())
    }
}

/// Control plane that hands out placeholder tokens
#[derive(Debug, Clone, Default)]
pub struct InMemoryControlPlane {
    log: MutationLog,
}

impl InMemoryControlPlane {
    pub fn new(log: MutationLog) -> Self {
        Self { log }
    }

    /// Documents submitted so far, keyed by `(section, key)`
    pub fn documents(&self) -> BTreeMap<(String, String), Value> {
        self.log
            .entries()
            .into_iter()
            .filter_map(|m| match m {
                Mutation::Config { section, key, document } => Some(((section, key), document)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn issue_token(&self, request: &TokenRequest) -> Result<String, AdapterError> {
        self.log.record(Mutation::Token {
            name: request.name.clone(),
            roles: request.roles.clone(),
            expires_on: request.expires_on,
        });
        Ok(format!("dry-run-token-{}", request.name))
    }

    async fn update_config(
        &self,
        section: &str,
        key: &str,
        document: &Value,
        _description: &str,
    ) -> Result<(), AdapterError> {
        self.log.record(Mutation::Config {
            section: section.to_string(),
            key: key.to_string(),
            document: document.clone(),
        });
        Ok(())
    }

    async fn set_default_profile(&self, kind: &str, key: &str) -> Result<(), AdapterError> {
        self.log.record(Mutation::DefaultProfile {
            kind: kind.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }
}
