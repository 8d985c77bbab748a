//! # Runbook Module
//!
//! Turns an alert payload into a remediation and runs it.
//!
//! - [`Dispatcher`] decodes the payload into a [`ServiceIdentifier`] and
//!   checks it against the [`ServicePolicy`]
//! - [`RunbookAction`] binds the identifier to the configured
//!   [`CommandTemplate`] as an argument vector (never a shell line)
//! - [`RunbookExecutor`] runs the action; [`ProcessExecutor`] is the
//!   process-manager implementation

pub mod action;
pub mod dispatcher;
pub mod executor;

pub use action::{CommandTemplate, RunbookAction};
pub use dispatcher::{decode_payload, DispatchError, Dispatcher, ServiceIdentifier, ServicePolicy};
pub use executor::{ExecutionError, ExecutionResult, ProcessExecutor, RunbookExecutor};
