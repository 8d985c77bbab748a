//! # Dispatcher
//!
//! Maps a raw alert payload to the service it names. The mapping is identity:
//! the decoded text *is* the service identifier. Because that text comes from
//! whoever can publish to the queue, it is checked against a safe-character
//! pattern and an optional allow-list before any action is built.

use std::collections::HashSet;

use regex::Regex;
use thiserror::Error;

use super::action::{CommandTemplate, RunbookAction};
use crate::config::{ConfigResult, ConfigurationError, RunbookConfig, DEFAULT_SERVICE_PATTERN};

/// Per-message rejection; the delivery is acknowledged and nothing runs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Payload is not valid UTF-8: {reason}")]
    InvalidUtf8 { reason: String },

    #[error("Payload is empty")]
    EmptyPayload,

    #[error("Service identifier {identifier:?} does not match pattern {pattern}")]
    UnsafeIdentifier { identifier: String, pattern: String },

    #[error("Service identifier {identifier:?} is not in the allow-list")]
    NotAllowed { identifier: String },
}

/// Name of the service an alert asks us to remediate
///
/// Never empty; holds the payload text verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentifier(String);

impl ServiceIdentifier {
    pub fn new(identifier: impl Into<String>) -> Result<Self, DispatchError> {
        let identifier = identifier.into();
        if identifier.is_empty() {
            return Err(DispatchError::EmptyPayload);
        }
        Ok(Self(identifier))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ServiceIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Decode a payload into a service identifier without applying any policy
pub fn decode_payload(payload: &[u8]) -> Result<ServiceIdentifier, DispatchError> {
    let text = std::str::from_utf8(payload).map_err(|e| DispatchError::InvalidUtf8 {
        reason: e.to_string(),
    })?;
    ServiceIdentifier::new(text)
}

/// Which identifiers may reach the executor
#[derive(Debug, Clone)]
pub struct ServicePolicy {
    pattern: Regex,
    allowed: HashSet<String>,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_SERVICE_PATTERN).expect("default service pattern is valid"),
            allowed: HashSet::new(),
        }
    }
}

impl ServicePolicy {
    pub fn new<I, S>(pattern: &str, allowed: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pattern = Regex::new(pattern).map_err(|e| {
            ConfigurationError::invalid_value("RUNBOOK_SERVICE_PATTERN", pattern, e.to_string())
        })?;
        Ok(Self {
            pattern,
            allowed: allowed.into_iter().map(Into::into).collect(),
        })
    }

    pub fn from_config(config: &RunbookConfig) -> ConfigResult<Self> {
        Self::new(&config.service_pattern, config.allowed_services.iter().cloned())
    }

    /// Allow-list is in force
    pub fn is_restricted(&self) -> bool {
        !self.allowed.is_empty()
    }

    pub fn check(&self, identifier: &ServiceIdentifier) -> Result<(), DispatchError> {
        if !self.pattern.is_match(identifier.as_str()) {
            return Err(DispatchError::UnsafeIdentifier {
                identifier: identifier.as_str().to_string(),
                pattern: self.pattern.as_str().to_string(),
            });
        }
        if self.is_restricted() && !self.allowed.contains(identifier.as_str()) {
            return Err(DispatchError::NotAllowed {
                identifier: identifier.as_str().to_string(),
            });
        }
        Ok(())
    }
}

/// Resolves payloads to remediation actions
#[derive(Debug, Clone)]
pub struct Dispatcher {
    policy: ServicePolicy,
    template: CommandTemplate,
}

impl Dispatcher {
    pub fn new(policy: ServicePolicy, template: CommandTemplate) -> Self {
        Self { policy, template }
    }

    pub fn from_config(config: &RunbookConfig) -> ConfigResult<Self> {
        Ok(Self::new(
            ServicePolicy::from_config(config)?,
            CommandTemplate::parse(&config.command)?,
        ))
    }

    /// Decode and vet a payload
    pub fn dispatch(&self, payload: &[u8]) -> Result<ServiceIdentifier, DispatchError> {
        let identifier = decode_payload(payload)?;
        self.policy.check(&identifier)?;
        Ok(identifier)
    }

    /// Decode, vet, and bind a payload to the restart action
    pub fn resolve(&self, payload: &[u8]) -> Result<RunbookAction, DispatchError> {
        let identifier = self.dispatch(payload)?;
        Ok(RunbookAction::restart(identifier, self.template.clone()))
    }

    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(ServicePolicy::default(), CommandTemplate::default())
    }

    #[test]
    fn test_dispatch_is_identity_on_valid_text() {
        let identifier = dispatcher().dispatch(b"inventory-service").unwrap();
        assert_eq!(identifier.as_str(), "inventory-service");
    }

    #[test]
    fn test_empty_payload_rejected_before_action() {
        assert_eq!(dispatcher().dispatch(b""), Err(DispatchError::EmptyPayload));
        assert!(matches!(
            dispatcher().resolve(b""),
            Err(DispatchError::EmptyPayload)
        ));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let result = dispatcher().dispatch(&[0x66, 0x6f, 0xff, 0xfe]);
        assert!(matches!(result, Err(DispatchError::InvalidUtf8 { .. })));
    }

    #[test]
    fn test_decode_payload_keeps_shell_metacharacters_verbatim() {
        let identifier = decode_payload(b"web; rm -rf /").unwrap();
        assert_eq!(identifier.as_str(), "web; rm -rf /");
    }

    #[test]
    fn test_unsafe_identifiers_rejected() {
        for payload in [
            "web; rm -rf /",
            "$(reboot)",
            "api service",
            "payment-service\n",
            "-rm",
            "../etc",
        ] {
            let result = dispatcher().dispatch(payload.as_bytes());
            assert!(
                matches!(result, Err(DispatchError::UnsafeIdentifier { .. })),
                "expected {payload:?} to be rejected, got {result:?}"
            );
        }
    }

    #[test]
    fn test_allow_list() {
        let policy =
            ServicePolicy::new(DEFAULT_SERVICE_PATTERN, ["payment-service", "inventory-service"])
                .unwrap();
        assert!(policy.is_restricted());

        let dispatcher = Dispatcher::new(policy, CommandTemplate::default());
        assert!(dispatcher.dispatch(b"payment-service").is_ok());
        assert_eq!(
            dispatcher.dispatch(b"billing-service"),
            Err(DispatchError::NotAllowed {
                identifier: "billing-service".to_string()
            })
        );
    }

    #[test]
    fn test_resolve_builds_restart_action() {
        let action = dispatcher().resolve(b"payment-service").unwrap();
        assert_eq!(action.target.as_str(), "payment-service");
        assert_eq!(
            action.argv(),
            vec!["docker", "compose", "restart", "payment-service"]
        );
    }

    #[test]
    fn test_from_config_rejects_bad_pattern() {
        let config = RunbookConfig {
            service_pattern: "(".to_string(),
            ..Default::default()
        };
        assert!(Dispatcher::from_config(&config).is_err());
    }
}
