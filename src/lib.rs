#![allow(clippy::doc_markdown)] // Allow technical terms like RabbitMQ, AMQP in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Runbook Listener
//!
//! Alert-driven remediation: consume service identifiers from a RabbitMQ
//! queue and restart each named service through the process manager.
//!
//! ## Pipeline
//!
//! ```text
//! broker -> messaging (Connector) -> consumer (loop) -> runbook::Dispatcher
//!        -> runbook::ProcessExecutor -> process manager
//! ```
//!
//! Processing is strictly sequential: one message is in flight at a time and
//! the next delivery is not pulled until the current remediation returns.
//!
//! ## Module Organization
//!
//! - [`config`] - Environment configuration (`RABBITMQ_*`, `RUNBOOK_*`)
//! - [`messaging`] - Broker abstraction with RabbitMQ and in-memory providers
//! - [`runbook`] - Payload dispatch, remediation actions, and execution
//! - [`consumer`] - The consume loop and its acknowledgment policy
//! - [`error`] - Process-fatal error type
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runbook_listener::config::ListenerConfig;
//! use runbook_listener::consumer::RemediationConsumer;
//! use runbook_listener::messaging::RabbitMqMessagingService;
//! use runbook_listener::runbook::ProcessExecutor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ListenerConfig::from_env()?;
//! let messaging = RabbitMqMessagingService::connect(&config.broker).await?;
//! let executor = ProcessExecutor::from_config(&config.runbook);
//!
//! let mut consumer = RemediationConsumer::from_config(messaging, executor, &config)?;
//! consumer.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod runbook;

pub use config::{AckMode, BrokerEndpoint, ListenerConfig, RunbookConfig};
pub use consumer::{ConsumerState, ConsumerStats, MessageOutcome, RemediationConsumer};
pub use error::{ListenerError, Result};
