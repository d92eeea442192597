//! Error types for the ACME engine.

use thiserror::Error;

/// Every fatal condition of an issuance run.
///
/// None of these are retried inside a run; the only automatic retries are
/// the challenge status poll and the DNS propagation check.
#[derive(Debug, Error)]
pub enum AcmeError {
    /// Missing ACL/hook for a domain, unusable working directory
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Key generation failure, key or CSR failing its validity check
    #[error("crypto error: {0}")]
    Crypto(String),

    /// CA unreachable, missing expected header
    #[error("transport error: {0}")]
    Transport(String),

    /// Unexpected HTTP status at a non-idempotent step
    #[error("{step} failed with status {status}: {detail}")]
    Protocol {
        step: &'static str,
        status: u16,
        detail: String,
    },

    /// Challenge resolved to invalid, or a self-check never matched
    #[error("validation of {domain} failed: {detail}")]
    Validation { domain: String, detail: String },

    /// Copying artifacts or running the reload command failed
    #[error("deployment error: {0}")]
    Deployment(String),

    /// Filesystem error in the working directory
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AcmeError {
    /// Short label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            AcmeError::Configuration(_) => "configuration",
            AcmeError::Crypto(_) => "crypto",
            AcmeError::Transport(_) => "transport",
            AcmeError::Protocol { .. } => "protocol",
            AcmeError::Validation { .. } => "validation",
            AcmeError::Deployment(_) => "deployment",
            AcmeError::Io(_) => "io",
        }
    }

    pub(crate) fn validation(domain: &str, detail: impl Into<String>) -> Self {
        AcmeError::Validation {
            domain: domain.to_string(),
            detail: detail.into(),
        }
    }
}

impl From<reqwest::Error> for AcmeError {
    fn from(err: reqwest::Error) -> Self {
        AcmeError::Transport(err.to_string())
    }
}

impl From<tempfile::PersistError> for AcmeError {
    fn from(err: tempfile::PersistError) -> Self {
        AcmeError::Io(err.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_surfaces_ca_detail() {
        let err = AcmeError::Protocol {
            step: "new-authz",
            status: 400,
            detail: "Error creating new authz :: Invalid character in DNS name".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "new-authz failed with status 400: Error creating new authz :: Invalid character in DNS name"
        );
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn test_io_conversion() {
        let err: AcmeError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("gone"));
    }
}
