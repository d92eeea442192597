//! Endpoint validation
//!
//! Validates the CA base URL and the subscriber agreement URL.

use super::{ErrorCategory, ValidationError, ValidationResult};
use crate::Config;
use url::Url;

/// Validate CA-facing URLs
pub fn validate_endpoints(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    for (label, value) in [("ca", &config.acme.ca), ("agreement", &config.acme.agreement)] {
        match Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {}
            Ok(url) => {
                result.add_error(ValidationError::new(
                    ErrorCategory::Network,
                    format!(
                        "'{}' must be an http(s) URL with a host, got scheme '{}'",
                        label,
                        url.scheme()
                    ),
                ));
            }
            Err(e) => {
                result.add_error(ValidationError::new(
                    ErrorCategory::Network,
                    format!("'{}' is not a valid URL ({}): {}", label, value, e),
                ));
            }
        }
    }

    result
}
