//! # Listener Configuration
//!
//! All configuration comes from the process environment and is read exactly
//! once at startup. Two sections exist:
//!
//! - `RABBITMQ_*` populates [`BrokerEndpoint`] (where alerts arrive)
//! - `RUNBOOK_*` populates [`RunbookConfig`] (what a remediation runs and how)
//!
//! Every field has a default, so an empty environment yields a listener on
//! `localhost` consuming the `alerts` queue and running
//! `docker compose restart <service>`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use runbook_listener::config::ListenerConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ListenerConfig::from_env()?;
//! println!("consuming {} on {}", config.broker.queue, config.broker.redacted_uri());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};

/// Environment prefix for broker settings (`RABBITMQ_HOST`, `RABBITMQ_QUEUE`, ...)
pub const BROKER_ENV_PREFIX: &str = "RABBITMQ";

/// Environment prefix for remediation settings (`RUNBOOK_COMMAND`, ...)
pub const RUNBOOK_ENV_PREFIX: &str = "RUNBOOK";

/// Placeholder token substituted with the service identifier
pub const SERVICE_PLACEHOLDER: &str = "{service}";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_QUEUE: &str = "alerts";
pub const DEFAULT_PORT: u16 = 5672;
pub const DEFAULT_COMMAND: &str = "docker compose restart {service}";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_SERVICE_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$";

/// Root configuration, immutable for the lifetime of the process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub broker: BrokerEndpoint,
    pub runbook: RunbookConfig,
}

impl ListenerConfig {
    /// Check cross-field constraints the deserializer cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        self.broker.validate()?;
        self.runbook.validate()
    }

    /// JSON view of the configuration safe to write to logs
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(url) = value.pointer_mut("/broker/url") {
            if !url.is_null() {
                *url = serde_json::Value::String(self.broker.redacted_uri());
            }
        }
        value
    }
}

/// Where alerts are consumed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct BrokerEndpoint {
    /// Broker network address
    pub host: String,

    /// Queue carrying one service identifier per message
    pub queue: String,

    pub port: u16,

    /// Virtual host, `/` by default
    pub vhost: String,

    /// Full AMQP URI; overrides host, port and vhost when set
    pub url: Option<String>,

    /// Declare the queue durable. A plain declare is non-durable, and
    /// re-declaring an existing queue with different flags fails.
    pub durable: bool,

    /// Deliveries the broker may push before we ack
    pub prefetch_count: u16,
}

impl Default for BrokerEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            queue: DEFAULT_QUEUE.to_string(),
            port: DEFAULT_PORT,
            vhost: "/".to_string(),
            url: None,
            durable: false,
            prefetch_count: 1,
        }
    }
}

impl BrokerEndpoint {
    /// AMQP URI used to connect
    pub fn amqp_uri(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "amqp://{}:{}/{}",
                self.host,
                self.port,
                self.vhost.replace('/', "%2f")
            ),
        }
    }

    /// AMQP URI with any credentials masked
    pub fn redacted_uri(&self) -> String {
        let uri = self.amqp_uri();
        match (uri.find("://"), uri.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}***{}", &uri[..scheme_end + 3], &uri[at..])
            }
            _ => uri,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.url.is_none() && self.host.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "RABBITMQ_HOST",
                "broker endpoint",
            ));
        }
        if self.queue.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "RABBITMQ_QUEUE",
                "broker endpoint",
            ));
        }
        if self.prefetch_count == 0 {
            return Err(ConfigurationError::invalid_value(
                "RABBITMQ_PREFETCH_COUNT",
                "0",
                "prefetch of 0 means unlimited deliveries in flight",
            ));
        }
        if let Some(url) = &self.url {
            if !(url.starts_with("amqp://") || url.starts_with("amqps://")) {
                return Err(ConfigurationError::invalid_value(
                    "RABBITMQ_URL",
                    self.redacted_uri(),
                    "expected an amqp:// or amqps:// URI",
                ));
            }
        }
        Ok(())
    }
}

/// When a delivery is acknowledged relative to its remediation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Ack as soon as the message is received (at-most-once; a crash mid
    /// remediation loses the alert)
    #[default]
    OnReceipt,
    /// Ack once the executor returns, whatever its outcome
    AfterExecution,
}

impl std::fmt::Display for AckMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnReceipt => write!(f, "on_receipt"),
            Self::AfterExecution => write!(f, "after_execution"),
        }
    }
}

/// What a remediation runs and the guard rails around it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RunbookConfig {
    /// Whitespace-separated argument vector; `{service}` marks the target
    pub command: String,

    /// Upper bound on a single remediation
    pub timeout_seconds: u64,

    /// Directory the command runs in (compose project directory)
    pub working_dir: Option<PathBuf>,

    /// When non-empty, only these identifiers are remediated
    pub allowed_services: Vec<String>,

    /// Identifiers must match this pattern before reaching the executor
    pub service_pattern: String,

    pub ack_mode: AckMode,
}

impl Default for RunbookConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_COMMAND.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            working_dir: None,
            allowed_services: Vec::new(),
            service_pattern: DEFAULT_SERVICE_PATTERN.to_string(),
            ack_mode: AckMode::default(),
        }
    }
}

impl RunbookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.command.split_whitespace().next().is_none() {
            return Err(ConfigurationError::missing_required_field(
                "RUNBOOK_COMMAND",
                "runbook",
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "RUNBOOK_TIMEOUT_SECONDS",
                "0",
                "remediation must be time-bounded",
            ));
        }
        if let Err(e) = regex::Regex::new(&self.service_pattern) {
            return Err(ConfigurationError::invalid_value(
                "RUNBOOK_SERVICE_PATTERN",
                self.service_pattern.clone(),
                e.to_string(),
            ));
        }
        if let Some(dir) = &self.working_dir {
            if !dir.is_dir() {
                return Err(ConfigurationError::invalid_value(
                    "RUNBOOK_WORKING_DIR",
                    dir.display().to_string(),
                    "not a directory",
                ));
            }
        }
        Ok(())
    }
}
