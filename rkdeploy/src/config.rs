//! YAML configuration for the status check.
//!
//! Every field is optional in the file; command-line flags override
//! whatever the file sets.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::label::RUN_ID_LABEL;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default = "default_namespaces")]
    pub namespaces: Vec<String>,
    /// Global per-deployment deadline, in seconds.
    #[serde(default = "default_deadline_seconds")]
    pub deadline_seconds: u64,
    #[serde(default = "default_poll_period_ms")]
    pub poll_period_ms: u64,
    /// Label key carrying the run id on deployed resources.
    #[serde(default = "default_label_key")]
    pub label_key: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            namespaces: default_namespaces(),
            deadline_seconds: default_deadline_seconds(),
            poll_period_ms: default_poll_period_ms(),
            label_key: default_label_key(),
            context: None,
            kubeconfig: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}

fn default_namespaces() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_deadline_seconds() -> u64 {
    600
}

fn default_poll_period_ms() -> u64 {
    1000
}

fn default_label_key() -> String {
    RUN_ID_LABEL.to_string()
}
