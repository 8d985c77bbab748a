//! Consumer lifecycle state and per-message outcomes.

use crate::runbook::{DispatchError, ExecutionError, ExecutionResult};

/// Where the consumer loop is in its lifecycle
///
/// `Connecting -> Listening -> Processing -> Listening ... -> Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Registering with the broker; never retried
    Connecting,
    /// Suspended waiting for the next delivery
    Listening,
    /// Running one message through dispatch and execution
    Processing,
    Terminated,
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Listening => write!(f, "listening"),
            Self::Processing => write!(f, "processing"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// What happened to one delivery; the delivery is acknowledged in every case
#[derive(Debug)]
pub enum MessageOutcome {
    /// The command ran; `succeeded` mirrors its exit status
    Remediated(ExecutionResult),
    /// Payload was not a usable service identifier; nothing ran
    Rejected(DispatchError),
    /// The command could not be run to completion
    ExecutionFailed(ExecutionError),
}

impl MessageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Remediated(result) if result.succeeded)
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Remediated(result) if result.succeeded => "succeeded",
            Self::Remediated(_) => "exited_non_zero",
            Self::Rejected(_) => "rejected",
            Self::ExecutionFailed(_) => "execution_failed",
        }
    }
}

/// Running counters for the process lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub acknowledged: u64,
    /// Commands that exited zero
    pub remediated: u64,
    /// Commands that exited non-zero, timed out, or failed to spawn
    pub failed: u64,
    pub rejected: u64,
}

impl ConsumerStats {
    pub(crate) fn record(&mut self, outcome: &MessageOutcome) {
        match outcome {
            MessageOutcome::Remediated(result) if result.succeeded => self.remediated += 1,
            MessageOutcome::Remediated(_) | MessageOutcome::ExecutionFailed(_) => self.failed += 1,
            MessageOutcome::Rejected(_) => self.rejected += 1,
        }
    }
}
