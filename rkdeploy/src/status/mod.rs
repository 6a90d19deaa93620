//! Rollout status checking for deployed workloads.
//!
//! The [`StatusChecker`] discovers the deployments a run created, then
//! watches each one concurrently until it becomes ready, fails, times
//! out, or the whole check is cancelled. Progress is streamed as it
//! happens and the final verdict aggregates every resource's outcome.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc, watch};
use tracing::{debug, info};

use crate::diag::Diagnose;
use crate::kube::{ResourceLister, RolloutStatus};
use crate::label::Labeller;

pub mod codes;
pub mod counter;
mod poll;
mod printer;
pub mod resource;

pub use codes::{ActionableErr, StatusCode};
pub use resource::Resource;

use counter::Counter;
use poll::{Event, PollTask};

/// Ceiling for how long any single deployment is watched.
pub const DEFAULT_STATUS_CHECK_DEADLINE: Duration = Duration::from_secs(600);

pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(1000);

/// Deployments that never set `progressDeadlineSeconds` come back from
/// the API server with this value filled in, so seeing it means the
/// user declared nothing.
const K8S_DEFAULT_PROGRESS_DEADLINE_SECS: i32 = 600;

/// Aggregate failure of a status check run.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StatusError {
    /// Code of the first failed resource in creation order.
    pub code: StatusCode,
    pub message: String,
}

pub struct StatusChecker {
    lister: Arc<dyn ResourceLister>,
    rollout: Arc<dyn RolloutStatus>,
    diagnose: Arc<dyn Diagnose>,
    labeller: Labeller,
    namespaces: Vec<String>,
    deadline: Duration,
    poll_period: Duration,
    out: Box<dyn Write + Send>,
}

impl StatusChecker {
    pub fn new(
        lister: Arc<dyn ResourceLister>,
        rollout: Arc<dyn RolloutStatus>,
        diagnose: Arc<dyn Diagnose>,
        labeller: Labeller,
    ) -> Self {
        StatusChecker {
            lister,
            rollout,
            diagnose,
            labeller,
            namespaces: vec!["default".to_string()],
            deadline: DEFAULT_STATUS_CHECK_DEADLINE,
            poll_period: DEFAULT_POLL_PERIOD,
            out: Box::new(std::io::stdout()),
        }
    }

    pub fn with_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    pub fn with_output(mut self, out: Box<dyn Write + Send>) -> Self {
        self.out = out;
        self
    }

    /// Runs the status check to completion. Returns the overall outcome,
    /// with `Err` carrying the first failure code and a `k/n
    /// deployment(s) failed` message when any resource failed.
    pub async fn check(
        &mut self,
        cancel: watch::Receiver<bool>,
    ) -> Result<StatusCode, StatusError> {
        let resources = self.discover().await?;
        if resources.is_empty() {
            info!(run_id = %self.labeller.run_id(), "no deployments to verify");
            return Ok(StatusCode::Success);
        }
        info!(
            run_id = %self.labeller.run_id(),
            deployments = resources.len(),
            "checking rollout status"
        );

        let counter = Counter::new(resources.len());
        let resources: Vec<Arc<RwLock<Resource>>> = resources
            .into_iter()
            .map(|res| Arc::new(RwLock::new(res)))
            .collect();

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        for (idx, resource) in resources.iter().enumerate() {
            let task = PollTask {
                rollout: Arc::clone(&self.rollout),
                diagnose: Arc::clone(&self.diagnose),
                label_key: self.labeller.key().to_string(),
                label_value: self.labeller.run_id().to_string(),
                period: self.poll_period,
            };
            tokio::spawn(task.run(idx, Arc::clone(resource), cancel.clone(), events_tx.clone()));
        }
        drop(events_tx);

        let mut finished = 0;
        while let Some(event) = events_rx.recv().await {
            match event {
                Event::Changed(_) => {
                    printer::print_status(&mut *self.out, &resources).await;
                }
                Event::Done(idx) => {
                    let res = resources[idx].read().await;
                    let code = res.status().code;
                    let failed =
                        code != StatusCode::Success && code != StatusCode::UserCancelled;
                    let counts = counter.mark_processed(failed);
                    printer::print_status_check_summary(&mut *self.out, &res, counts);
                    drop(res);

                    finished += 1;
                    if finished == resources.len() {
                        break;
                    }
                }
            }
        }

        self.verdict(&counter, &resources).await
    }

    /// Lists deployments in every configured namespace and keeps the
    /// ones labelled with this run's id, in listing order.
    async fn discover(&self) -> Result<Vec<Resource>, StatusError> {
        let mut resources = Vec::new();
        for namespace in &self.namespaces {
            let deployments =
                self.lister
                    .list_deployments(namespace)
                    .await
                    .map_err(|err| StatusError {
                        code: StatusCode::DeploymentFetchErr,
                        message: format!(
                            "could not fetch deployments in namespace {namespace}: {err}"
                        ),
                    })?;

            for deployment in deployments {
                if !self.labeller.matches(&deployment.metadata.labels) {
                    continue;
                }
                let deadline = effective_deadline(
                    deployment.spec.progress_deadline_seconds,
                    self.deadline,
                );
                debug!(
                    deployment = %deployment.metadata.name,
                    namespace = %namespace,
                    deadline_secs = deadline.as_secs(),
                    "watching deployment"
                );
                resources.push(Resource::new(
                    deployment.metadata.name,
                    namespace.clone(),
                    deadline,
                ));
            }
        }
        Ok(resources)
    }

    async fn verdict(
        &self,
        counter: &Counter,
        resources: &[Arc<RwLock<Resource>>],
    ) -> Result<StatusCode, StatusError> {
        let counts = counter.copy();
        if counts.failed == 0 {
            let mut all_cancelled = true;
            for resource in resources {
                if resource.read().await.status().code != StatusCode::UserCancelled {
                    all_cancelled = false;
                    break;
                }
            }
            if all_cancelled {
                info!("status check cancelled");
                return Ok(StatusCode::UserCancelled);
            }
            info!(deployments = counts.total, "all deployments stabilized");
            return Ok(StatusCode::Success);
        }

        let mut first = StatusCode::Unknown;
        for resource in resources {
            let code = resource.read().await.status().code;
            if code != StatusCode::Success && code != StatusCode::UserCancelled {
                first = code;
                break;
            }
        }
        Err(StatusError {
            code: first,
            message: format!("{}/{} deployment(s) failed", counts.failed, counts.total),
        })
    }
}

/// Resolves the deadline for one deployment. A declared
/// `progressDeadlineSeconds` wins when it is a real user setting;
/// the Kubernetes default value or anything non-positive falls back to
/// the global deadline.
fn effective_deadline(declared_secs: Option<i32>, global: Duration) -> Duration {
    match declared_secs {
        Some(secs) if secs > 0 && secs < K8S_DEFAULT_PROGRESS_DEADLINE_SECS => {
            Duration::from_secs(secs as u64)
        }
        _ => global,
    }
}
