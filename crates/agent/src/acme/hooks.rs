//! External commands that publish DNS-01 TXT records

use std::process::Command;

use certsmith_config::DnsHooks;
use tracing::{debug, info};

use super::error::AcmeError;

/// Adds and deletes the `_acme-challenge` TXT record for a domain
pub trait DnsHook: Send + Sync {
    fn add(&self, domain: &str, value: &str) -> Result<(), AcmeError>;
    fn delete(&self, domain: &str, value: &str) -> Result<(), AcmeError>;
}

/// Runs the configured commands as `<command> <domain> <value>` via `sh -c`
#[derive(Debug, Clone)]
pub struct CommandHook {
    add: String,
    delete: String,
}

impl CommandHook {
    pub fn new(add: impl Into<String>, delete: impl Into<String>) -> Self {
        Self {
            add: add.into(),
            delete: delete.into(),
        }
    }

    /// Both commands are required
    pub fn from_config(hooks: &DnsHooks, domain: &str) -> Result<Self, AcmeError> {
        match (&hooks.add, &hooks.delete) {
            (Some(add), Some(delete)) => Ok(Self::new(add, delete)),
            _ => Err(AcmeError::Configuration(format!(
                "dns-01 for {} needs both an add and a delete hook",
                domain
            ))),
        }
    }

    fn run(&self, action: &str, command: &str, domain: &str, value: &str) -> Result<(), AcmeError> {
        debug!(action, command = %command, domain = %domain, "Running DNS hook");

        // The arguments are passed as positional parameters, never spliced
        // into the script text
        let output = Command::new("sh")
            .arg("-c")
            .arg(format!("{} \"$1\" \"$2\"", command))
            .arg("certsmith-hook")
            .arg(domain)
            .arg(value)
            .output()
            .map_err(|e| {
                AcmeError::validation(domain, format!("cannot run DNS {} hook '{}': {}", action, command, e))
            })?;

        if !output.status.success() {
            return Err(AcmeError::validation(
                domain,
                format!(
                    "DNS {} hook '{}' exited with {}: {}",
                    action,
                    command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        info!(action, domain = %domain, "DNS hook completed");
        Ok(())
    }
}

impl DnsHook for CommandHook {
    fn add(&self, domain: &str, value: &str) -> Result<(), AcmeError> {
        self.run("add", &self.add, domain, value)
    }

    fn delete(&self, domain: &str, value: &str) -> Result<(), AcmeError> {
        self.run("delete", &self.delete, domain, value)
    }
}
