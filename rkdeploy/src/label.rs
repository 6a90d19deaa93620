//! Run identity: the label pair that scopes discovery to this invocation.

use std::collections::HashMap;

use uuid::Uuid;

/// Label key stamped on every resource deployed by a run.
pub const RUN_ID_LABEL: &str = "rkdeploy.rs/run-id";

#[derive(Debug, Clone)]
pub struct Labeller {
    key: String,
    run_id: String,
}

impl Labeller {
    /// A labeller with a fresh random run id.
    pub fn new() -> Self {
        Labeller {
            key: RUN_ID_LABEL.to_string(),
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// A labeller for an existing run, e.g. one started by `rkdeploy deploy`.
    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Labeller {
            key: RUN_ID_LABEL.to_string(),
            run_id: run_id.into(),
        }
    }

    /// Overrides the label key, for clusters where another tool owns the
    /// standard one.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Whether a resource's labels mark it as created by this run.
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        labels.get(&self.key).map(String::as_str) == Some(self.run_id.as_str())
    }
}

impl Default for Labeller {
    fn default() -> Self {
        Labeller::new()
    }
}
