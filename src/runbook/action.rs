//! # Runbook Actions
//!
//! A remediation is an argument vector handed straight to the OS. The
//! service identifier is substituted into whole arguments, so whatever it
//! contains it can never become a second command.

use crate::config::{ConfigResult, ConfigurationError, DEFAULT_COMMAND, SERVICE_PLACEHOLDER};

use super::dispatcher::ServiceIdentifier;

/// Parsed `RUNBOOK_COMMAND`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            args: vec![
                "compose".to_string(),
                "restart".to_string(),
                SERVICE_PLACEHOLDER.to_string(),
            ],
        }
    }
}

impl CommandTemplate {
    pub fn new<P, I, S>(program: P, args: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a command line on whitespace
    ///
    /// No quoting rules apply: arguments containing spaces need
    /// [`CommandTemplate::new`].
    pub fn parse(command: &str) -> ConfigResult<Self> {
        let mut tokens = command.split_whitespace();
        let program = tokens.next().ok_or_else(|| {
            ConfigurationError::invalid_value("RUNBOOK_COMMAND", command, "command is empty")
        })?;
        Ok(Self::new(program, tokens))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn has_placeholder(&self) -> bool {
        self.program.contains(SERVICE_PLACEHOLDER)
            || self.args.iter().any(|arg| arg.contains(SERVICE_PLACEHOLDER))
    }

    /// Program with the target substituted, e.g. `/opt/runbooks/{service}.sh`
    pub fn render_program(&self, target: &ServiceIdentifier) -> String {
        self.program.replace(SERVICE_PLACEHOLDER, target.as_str())
    }

    /// Arguments with the target substituted; appended when no placeholder exists
    pub fn render_args(&self, target: &ServiceIdentifier) -> Vec<String> {
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(SERVICE_PLACEHOLDER, target.as_str()))
            .collect();
        if !self.has_placeholder() {
            args.push(target.as_str().to_string());
        }
        args
    }
}

impl std::fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for CommandTemplate {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// "Restart `target` via the process manager", computed per message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunbookAction {
    pub command_template: CommandTemplate,
    pub target: ServiceIdentifier,
}

impl RunbookAction {
    pub fn restart(target: ServiceIdentifier, command_template: CommandTemplate) -> Self {
        Self {
            command_template,
            target,
        }
    }

    pub fn program(&self) -> String {
        self.command_template.render_program(&self.target)
    }

    pub fn args(&self) -> Vec<String> {
        self.command_template.render_args(&self.target)
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.program()];
        argv.extend(self.args());
        argv
    }

    /// Human-readable form for logs; not executed
    pub fn command_line(&self) -> String {
        self.argv().join(" ")
    }
}
