//! `helm` implementation of the package installer

use crate::adapters::command::CommandRunner;
use crate::adapters::{AdapterError, PackageInstaller, ReleaseRequest};
use async_trait::async_trait;
use std::io::Write;
use tracing::info;

/// Seconds allowed on top of helm's own `--timeout` before the process is killed
const KILL_GRACE_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct HelmInstaller {
    runner: CommandRunner,
}

impl HelmInstaller {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    fn decode_error(&self, reason: impl ToString) -> AdapterError {
        AdapterError::Decode {
            tool: self.runner.program().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Arguments for `helm upgrade --install`, reading values from `values_path`
pub fn upgrade_args(release: &ReleaseRequest, values_path: &str) -> Vec<String> {
    let mut args = vec![
        "upgrade".to_string(),
        "--install".to_string(),
        release.name.clone(),
        release.chart.clone(),
        "--namespace".to_string(),
        release.namespace.clone(),
        "--create-namespace".to_string(),
        "--wait".to_string(),
        "--timeout".to_string(),
        format!("{}s", release.timeout.as_secs()),
        "--values".to_string(),
        values_path.to_string(),
    ];
    if let Some(repo) = &release.repo {
        args.push("--repo".to_string());
        args.push(repo.clone());
    }
    if let Some(version) = &release.version {
        args.push("--version".to_string());
        args.push(version.clone());
    }
    args
}

#[async_trait]
impl PackageInstaller for HelmInstaller {
    async fn install_or_upgrade(&self, release: &ReleaseRequest) -> Result<(), AdapterError> {
        let values = serde_yaml::to_string(&release.values).map_err(|e| self.decode_error(e))?;

        // helm reads the values file itself, so it has to outlive the call
        let mut file = tempfile::Builder::new()
            .prefix("values-")
            .suffix(".yaml")
            .tempfile()
            .map_err(|e| self.decode_error(e))?;
        file.write_all(values.as_bytes()).map_err(|e| self.decode_error(e))?;

        let path = file.path().display().to_string();
        let runner = self
            .runner
            .with_timeout(release.timeout.as_secs() + KILL_GRACE_SECS);

        info!("Installing release {} ({})", release.name, release.chart);
        runner.run(&upgrade_args(release, &path), None).await?;
        Ok(())
    }
}
