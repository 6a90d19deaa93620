//! One trackable workload under status watch.
//!
//! A [`Resource`] is created once by discovery and then mutated only by
//! the single poller task that owns it; the orchestrator reads it for
//! reporting. The `changed` flag records whether the current status has
//! been shown to the user yet, which is what keeps incremental output to
//! at most one line per distinct status value.

use std::time::Duration;

use crate::diag::PodOutcome;

use super::codes::{ActionableErr, StatusCode};

const DEPLOYMENT_KIND: &str = "deployment";

#[derive(Debug, Clone)]
pub struct Resource {
    kind: &'static str,
    name: String,
    namespace: String,
    deadline: Duration,
    status: ActionableErr,
    changed: bool,
    pod_statuses: Vec<PodOutcome>,
    done: bool,
}

impl Resource {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, deadline: Duration) -> Self {
        Resource {
            kind: DEPLOYMENT_KIND,
            name: name.into(),
            namespace: namespace.into(),
            deadline,
            status: ActionableErr::new(StatusCode::Unknown, ""),
            changed: false,
            pod_statuses: Vec::new(),
            done: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn status(&self) -> &ActionableErr {
        &self.status
    }

    /// `ns:deployment/name`, with the namespace prefix omitted for the
    /// default namespace.
    pub fn qualified_name(&self) -> String {
        qualified(&self.namespace, self.kind, &self.name)
    }

    /// Records a newly observed status. Returns true and raises the
    /// `changed` flag only when the (code, message) pair differs from
    /// the current one, so re-observing the same unhealthy status leaves
    /// nothing to report.
    pub fn update_status(&mut self, ae: ActionableErr) -> bool {
        if self.status != ae {
            self.status = ae;
            self.changed = true;
            true
        } else {
            false
        }
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Clears the `changed` flag after the status has been printed.
    pub fn mark_reported(&mut self) {
        self.changed = false;
    }

    pub fn set_pod_statuses(&mut self, pods: Vec<PodOutcome>) {
        self.pod_statuses = pods;
    }

    pub fn pod_statuses(&self) -> &[PodOutcome] {
        &self.pod_statuses
    }

    pub fn mark_complete(&mut self) {
        self.done = true;
    }

    pub fn is_complete(&self) -> bool {
        self.done
    }
}

pub(crate) fn qualified(namespace: &str, kind: &str, name: &str) -> String {
    if namespace == "default" {
        format!("{kind}/{name}")
    } else {
        format!("{namespace}:{kind}/{name}")
    }
}
