//! # Listener Error Types
//!
//! Process-level errors. Everything surfaced here is fatal: the listener exits
//! and its supervisor restarts it. Per-message failures live in
//! [`crate::runbook::DispatchError`] and [`crate::runbook::ExecutionError`] and
//! never reach this type.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
}

impl ListenerError {
    /// True when the broker connection is gone and the supervisor should restart us
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Messaging(e) if e.is_connection_level())
    }
}

pub type Result<T> = std::result::Result<T, ListenerError>;
