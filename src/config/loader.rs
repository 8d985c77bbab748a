//! Configuration Loader
//!
//! Reads the `RABBITMQ_*` and `RUNBOOK_*` environment sections through the
//! `config` crate. Missing keys fall back to the struct defaults.

use config::{Config, Environment, Map};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::{ConfigResult, ConfigurationError};
use super::{BrokerEndpoint, ListenerConfig, RunbookConfig, BROKER_ENV_PREFIX, RUNBOOK_ENV_PREFIX};

impl ListenerConfig {
    /// Load and validate configuration from the process environment
    pub fn from_env() -> ConfigResult<Self> {
        Self::load(None)
    }

    /// Load and validate configuration from an explicit variable map
    ///
    /// Keys use the same names as the environment (`RABBITMQ_HOST`, ...).
    /// Useful for testing without mutating the process environment.
    pub fn from_source(vars: Map<String, String>) -> ConfigResult<Self> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<Map<String, String>>) -> ConfigResult<Self> {
        let vars = Some(drop_service_link_port(vars.unwrap_or_else(process_environment)));

        let broker: BrokerEndpoint = load_section(
            BROKER_ENV_PREFIX,
            Environment::with_prefix(BROKER_ENV_PREFIX).source(vars.clone()),
        )?;

        let runbook: RunbookConfig = load_section(
            RUNBOOK_ENV_PREFIX,
            Environment::with_prefix(RUNBOOK_ENV_PREFIX)
                .source(vars)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("allowed_services"),
        )?;

        let mut config = Self { broker, runbook };
        config.runbook.allowed_services = config
            .runbook
            .allowed_services
            .iter()
            .map(|service| service.trim().to_string())
            .filter(|service| !service.is_empty())
            .collect();
        config.validate()?;

        debug!(
            config = %config.sanitized(),
            "Listener configuration loaded"
        );

        Ok(config)
    }
}

/// Unicode environment variables; anything else is skipped
fn process_environment() -> Map<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Kubernetes injects `RABBITMQ_PORT=tcp://<ip>:<port>` for a Service named
/// `rabbitmq`; only a plain port number is taken as configuration.
fn drop_service_link_port(mut vars: Map<String, String>) -> Map<String, String> {
    let key = format!("{BROKER_ENV_PREFIX}_PORT");
    if let Some(value) = vars.get(&key) {
        if value.parse::<u16>().is_err() {
            warn!(
                variable = %key,
                value = %value,
                "Ignoring non-numeric broker port (service link?); using the default"
            );
            vars.remove(&key);
        }
    }
    vars
}

fn load_section<T: DeserializeOwned>(section: &str, source: Environment) -> ConfigResult<T> {
    Config::builder()
        .add_source(source.ignore_empty(true))
        .build()
        .and_then(|config| config.try_deserialize::<T>())
        .map_err(|e| ConfigurationError::load(section, e))
}
