//! Cluster collaborators behind trait seams.
//!
//! The status check talks to the cluster only through [`ResourceLister`],
//! [`RolloutStatus`] and [`crate::diag::Diagnose`]. The one production
//! implementation, [`Kubectl`], shells out to `kubectl`; transport
//! concerns (auth, retries at the wire level) stay inside it.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::diag::{Diagnose, PodOutcome, outcome_for_pod};

#[async_trait]
pub trait ResourceLister: Send + Sync {
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<common::Deployment>>;
}

#[async_trait]
pub trait RolloutStatus: Send + Sync {
    /// Raw rollout status text for one deployment; the engine parses it.
    async fn rollout_status(&self, namespace: &str, name: &str) -> Result<String>;
}

/// `kubectl`-backed implementation of all cluster seams.
#[derive(Debug, Clone, Default)]
pub struct Kubectl {
    context: Option<String>,
    kubeconfig: Option<PathBuf>,
}

impl Kubectl {
    pub fn new(context: Option<String>, kubeconfig: Option<PathBuf>) -> Self {
        Kubectl {
            context,
            kubeconfig,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("kubectl");
        if let Some(context) = &self.context {
            cmd.arg("--context").arg(context);
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    async fn run(mut cmd: Command) -> Result<String> {
        let output = cmd.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(anyhow!("{detail}"));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl ResourceLister for Kubectl {
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<common::Deployment>> {
        let mut cmd = self.command();
        cmd.args(["get", "deployments", "--namespace", namespace, "-o", "json"]);
        debug!(namespace, "listing deployments");
        let raw = Self::run(cmd).await?;
        let list: common::DeploymentList = serde_json::from_str(&raw)?;
        Ok(list.items)
    }
}

#[async_trait]
impl RolloutStatus for Kubectl {
    async fn rollout_status(&self, namespace: &str, name: &str) -> Result<String> {
        let mut cmd = self.command();
        cmd.args([
            "rollout",
            "status",
            "deployment",
            name,
            "--namespace",
            namespace,
            "--watch=false",
        ]);
        Self::run(cmd).await
    }
}

#[async_trait]
impl Diagnose for Kubectl {
    async fn diagnose(
        &self,
        namespace: &str,
        label_key: &str,
        label_value: &str,
    ) -> Result<Vec<PodOutcome>> {
        let selector = format!("{label_key}={label_value}");
        let mut cmd = self.command();
        cmd.args([
            "get",
            "pods",
            "--namespace",
            namespace,
            "-l",
            selector.as_str(),
            "-o",
            "json",
        ]);
        debug!(namespace, label_key, label_value, "diagnosing pods");
        let raw = Self::run(cmd).await?;
        let list: common::PodList = serde_json::from_str(&raw)?;
        Ok(list.items.iter().map(outcome_for_pod).collect())
    }
}
