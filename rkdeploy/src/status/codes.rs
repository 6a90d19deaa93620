//! Fixed taxonomy of status-check outcome codes.
//!
//! Every poll result is collapsed into one of these codes plus a human
//! message ([`ActionableErr`]). Whether a code is retried or stops a
//! resource's polling immediately is decided here, as data, not inferred
//! from message text. Both classification matches are exhaustive on
//! purpose: adding a code forces a decision in each of them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The rollout completed; terminal.
    Success,
    /// The check was cancelled by the user; terminal, never printed.
    UserCancelled,
    /// The per-resource deadline elapsed before the rollout stabilized.
    DeadlineExceeded,
    /// The rollout is still progressing.
    RolloutPending,
    /// The cluster API could not be reached.
    KubectlConnectionErr,
    /// Deployments could not be listed at all.
    DeploymentFetchErr,
    /// Unclassified error; retried until the deadline.
    Unknown,
    NodeDiskPressure,
    NodeMemoryPressure,
    NodePidPressure,
    NodeUnschedulable,
    ContainerCreating,
    PodInitializing,
    ContainerRestarting,
    ImagePullErr,
    ContainerTerminated,
    RunContainerErr,
}

impl StatusCode {
    /// Whether polling should continue after observing this code.
    pub fn is_retryable(self) -> bool {
        match self {
            StatusCode::RolloutPending
            | StatusCode::KubectlConnectionErr
            | StatusCode::Unknown
            | StatusCode::NodeDiskPressure
            | StatusCode::NodeMemoryPressure
            | StatusCode::NodePidPressure
            | StatusCode::NodeUnschedulable
            | StatusCode::ContainerCreating
            | StatusCode::PodInitializing
            | StatusCode::ContainerRestarting => true,
            StatusCode::Success
            | StatusCode::UserCancelled
            | StatusCode::DeadlineExceeded
            | StatusCode::DeploymentFetchErr
            | StatusCode::ImagePullErr
            | StatusCode::ContainerTerminated
            | StatusCode::RunContainerErr => false,
        }
    }

    /// Whether this code stops polling immediately even with deadline
    /// budget remaining.
    pub fn is_fatal(self) -> bool {
        match self {
            StatusCode::DeploymentFetchErr
            | StatusCode::ImagePullErr
            | StatusCode::ContainerTerminated
            | StatusCode::RunContainerErr => true,
            StatusCode::Success
            | StatusCode::UserCancelled
            | StatusCode::DeadlineExceeded
            | StatusCode::RolloutPending
            | StatusCode::KubectlConnectionErr
            | StatusCode::Unknown
            | StatusCode::NodeDiskPressure
            | StatusCode::NodeMemoryPressure
            | StatusCode::NodePidPressure
            | StatusCode::NodeUnschedulable
            | StatusCode::ContainerCreating
            | StatusCode::PodInitializing
            | StatusCode::ContainerRestarting => false,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// An outcome code paired with its human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionableErr {
    pub code: StatusCode,
    pub message: String,
}

impl ActionableErr {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        ActionableErr {
            code,
            message: message.into(),
        }
    }

    pub fn success() -> Self {
        ActionableErr::new(StatusCode::Success, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes_keep_polling() {
        for code in [
            StatusCode::RolloutPending,
            StatusCode::KubectlConnectionErr,
            StatusCode::Unknown,
            StatusCode::NodeDiskPressure,
            StatusCode::NodeMemoryPressure,
            StatusCode::NodePidPressure,
            StatusCode::NodeUnschedulable,
            StatusCode::ContainerCreating,
            StatusCode::PodInitializing,
            StatusCode::ContainerRestarting,
        ] {
            assert!(code.is_retryable(), "{code} should be retryable");
            assert!(!code.is_fatal(), "{code} should not be fatal");
        }
    }

    #[test]
    fn fatal_codes_stop_immediately() {
        for code in [
            StatusCode::ImagePullErr,
            StatusCode::ContainerTerminated,
            StatusCode::RunContainerErr,
            StatusCode::DeploymentFetchErr,
        ] {
            assert!(code.is_fatal(), "{code} should be fatal");
            assert!(!code.is_retryable(), "{code} should not be retryable");
        }
    }

    #[test]
    fn terminal_by_construction_codes_are_neither() {
        for code in [
            StatusCode::Success,
            StatusCode::UserCancelled,
            StatusCode::DeadlineExceeded,
        ] {
            assert!(!code.is_retryable());
            assert!(!code.is_fatal());
        }
    }
}
