//! Configuration validation
//!
//! Validation is split by concern:
//!
//! - [`network`] - CA and agreement endpoints
//! - [`domains`] - per-domain challenge prerequisites and key settings
//! - [`certs`] - certificates already present in the working directory
//! - [`lint`] - best-practice warnings that never block a run

use std::fmt;

use thiserror::Error;

use crate::Config;

pub mod certs;
pub mod domains;
pub mod lint;
pub mod network;

/// Area of the configuration an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Domain,
    Challenge,
    Key,
    Certificate,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Domain => "domain",
            ErrorCategory::Challenge => "challenge",
            ErrorCategory::Key => "key",
            ErrorCategory::Certificate => "certificate",
        };
        f.write_str(name)
    }
}

/// A blocking configuration problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ValidationError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// A non-blocking observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Configuration failed validation
#[derive(Debug, Error)]
#[error("configuration has {} error(s): {}", .errors.len(), summary(.errors))]
pub struct InvalidConfig {
    pub errors: Vec<ValidationError>,
}

fn summary(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Accumulated errors and warnings
#[derive(Debug, Default, Clone)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors become `Err`, warnings are handed back for logging
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, InvalidConfig> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(InvalidConfig {
                errors: self.errors,
            })
        }
    }
}

/// Run every static check (certificate inspection is separate since it
/// touches the filesystem)
pub fn validate_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.merge(network::validate_endpoints(config));
    result.merge(domains::validate_domains(config));
    result.merge(lint::lint_config(config));
    result
}
