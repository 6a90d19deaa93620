//! Pod-level diagnostics attached to an unhealthy workload.
//!
//! The status check never inspects pods itself; it asks a [`Diagnose`]
//! implementation for the pods behind a workload and records the
//! per-pod outcomes it gets back. The mapping from raw container states
//! to outcome codes lives here so it can be tested without a cluster.

use async_trait::async_trait;

use crate::status::codes::{ActionableErr, StatusCode};
use crate::status::resource::qualified;

/// Health verdict for one pod of a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodOutcome {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    pub ae: ActionableErr,
}

impl PodOutcome {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        phase: impl Into<String>,
        ae: ActionableErr,
    ) -> Self {
        PodOutcome {
            name: name.into(),
            namespace: namespace.into(),
            phase: phase.into(),
            ae,
        }
    }

    /// `ns:pod/name`, namespace prefix omitted for the default namespace.
    pub fn qualified_name(&self) -> String {
        qualified(&self.namespace, "pod", &self.name)
    }
}

/// Inspects the pods belonging to one deployed workload, scoped by label.
#[async_trait]
pub trait Diagnose: Send + Sync {
    async fn diagnose(
        &self,
        namespace: &str,
        label_key: &str,
        label_value: &str,
    ) -> anyhow::Result<Vec<PodOutcome>>;
}

/// Collapses a pod's container states into a single outcome.
///
/// The first problematic container wins; a pod with all containers
/// running (or no container statuses yet, e.g. phase Running without a
/// populated status) maps to success.
pub fn outcome_for_pod(pod: &common::Pod) -> PodOutcome {
    let name = pod.metadata.name.clone();
    let namespace = pod.metadata.namespace.clone();
    let phase = pod.status.phase.clone();

    // A pod the scheduler cannot place has no container states yet.
    for condition in &pod.status.conditions {
        if condition.condition_type == "PodScheduled"
            && condition.status == "False"
            && condition.reason.as_deref() == Some("Unschedulable")
        {
            let message = condition
                .message
                .clone()
                .unwrap_or_else(|| "pod is unschedulable".to_string());
            return PodOutcome::new(
                name,
                namespace,
                phase,
                ActionableErr::new(StatusCode::NodeUnschedulable, message),
            );
        }
    }

    for container in &pod.status.container_statuses {
        let Some(state) = &container.state else {
            continue;
        };

        if let Some(waiting) = &state.waiting {
            let reason = waiting.reason.as_deref().unwrap_or("");
            let message = waiting
                .message
                .clone()
                .unwrap_or_else(|| format!("container {} is waiting: {reason}", container.name));
            let code = match reason {
                "ImagePullBackOff" | "ErrImagePull" | "InvalidImageName" => {
                    StatusCode::ImagePullErr
                }
                "CrashLoopBackOff" => StatusCode::ContainerRestarting,
                "CreateContainerError" | "RunContainerError" => StatusCode::RunContainerErr,
                "ContainerCreating" => StatusCode::ContainerCreating,
                "PodInitializing" => StatusCode::PodInitializing,
                _ => StatusCode::Unknown,
            };
            return PodOutcome::new(name, namespace, phase, ActionableErr::new(code, message));
        }

        if let Some(terminated) = &state.terminated {
            if terminated.exit_code != 0 {
                let reason = terminated.reason.as_deref().unwrap_or("Error");
                let message = terminated.message.clone().unwrap_or_else(|| {
                    format!(
                        "container {} terminated with exit code {} ({reason})",
                        container.name, terminated.exit_code
                    )
                });
                return PodOutcome::new(
                    name,
                    namespace,
                    phase,
                    ActionableErr::new(StatusCode::ContainerTerminated, message),
                );
            }
        }
    }

    PodOutcome::new(name, namespace, phase, ActionableErr::success())
}
