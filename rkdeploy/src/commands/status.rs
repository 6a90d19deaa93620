//! The `status` command: wait for a run's deployments to stabilize.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio::sync::watch;
use tracing::{error, warn};

use crate::config::Config;
use crate::diag::Diagnose;
use crate::kube::{Kubectl, ResourceLister, RolloutStatus};
use crate::label::Labeller;
use crate::status::{StatusChecker, StatusCode};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Run id whose deployments are checked.
    #[arg(long, value_name = "RUN_ID", env = "RKDEPLOY_RUN_ID")]
    pub run_id: String,

    /// Namespace to search; repeatable.
    #[arg(short, long, value_name = "NAMESPACE")]
    pub namespace: Vec<String>,

    /// Global per-deployment deadline.
    #[arg(long, value_name = "SECONDS")]
    pub deadline_seconds: Option<u64>,

    #[arg(long, value_name = "MILLIS")]
    pub poll_period_ms: Option<u64>,

    /// YAML config file; flags override its values.
    #[arg(short = 'f', long = "file", value_name = "CONFIG_YAML")]
    pub config: Option<PathBuf>,

    /// kubectl context to use.
    #[arg(long, value_name = "CONTEXT")]
    pub context: Option<String>,

    #[arg(long, value_name = "KUBECONFIG", env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,
}

pub fn status_execute(args: StatusArgs) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_status_check(args))
}

async fn run_status_check(args: StatusArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if !args.namespace.is_empty() {
        config.namespaces = args.namespace;
    }
    if let Some(secs) = args.deadline_seconds {
        config.deadline_seconds = secs;
    }
    if let Some(ms) = args.poll_period_ms {
        config.poll_period_ms = ms;
    }
    if args.context.is_some() {
        config.context = args.context;
    }
    if args.kubeconfig.is_some() {
        config.kubeconfig = args.kubeconfig;
    }

    let labeller = Labeller::with_run_id(args.run_id).with_key(config.label_key.clone());
    let kubectl = Arc::new(Kubectl::new(config.context.clone(), config.kubeconfig.clone()));

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling status check");
            let _ = cancel_tx.send(true);
        }
    });

    let mut checker = StatusChecker::new(
        Arc::clone(&kubectl) as Arc<dyn ResourceLister>,
        Arc::clone(&kubectl) as Arc<dyn RolloutStatus>,
        kubectl as Arc<dyn Diagnose>,
        labeller,
    )
    .with_namespaces(config.namespaces.clone())
    .with_deadline(Duration::from_secs(config.deadline_seconds))
    .with_poll_period(Duration::from_millis(config.poll_period_ms));

    match checker.check(cancel_rx).await {
        Ok(StatusCode::UserCancelled) => {
            warn!("status check cancelled before completion");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(err) => {
            error!(code = %err.code, "{err}");
            Err(err.into())
        }
    }
}
