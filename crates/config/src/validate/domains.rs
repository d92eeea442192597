//! Domain validation
//!
//! Checks that every domain can actually be validated before any request
//! reaches the CA: each SAN entry needs an ACL location under HTTP-01, and
//! DNS-01 needs both record hooks.

use std::collections::HashSet;

use certsmith_common::ChallengeType;

use super::{ErrorCategory, ValidationError, ValidationResult};
use crate::{Config, DomainConfig};

/// Smallest RSA key accepted for account or domain keys
pub const MIN_KEY_LENGTH: u32 = 2048;

/// Largest RSA key accepted for account or domain keys
pub const MAX_KEY_LENGTH: u32 = 8192;

/// Validate all configured domains
pub fn validate_domains(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if let Some(message) = key_length_problem(config.acme.account_key_length) {
        result.add_error(ValidationError::new(
            ErrorCategory::Key,
            format!("account-key-length: {}", message),
        ));
    }

    let mut seen = HashSet::new();
    for domain in &config.domains {
        if !seen.insert(domain.name.to_ascii_lowercase()) {
            result.add_error(ValidationError::new(
                ErrorCategory::Domain,
                format!("Domain '{}' is configured more than once", domain.name),
            ));
        }
        result.merge(validate_domain(domain));
    }

    result
}

/// Validate the prerequisites of a single domain
pub fn validate_domain(domain: &DomainConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    for name in domain.san_list() {
        if !is_valid_hostname(&name) {
            result.add_error(ValidationError::new(
                ErrorCategory::Domain,
                format!("'{}' in domain '{}' is not a valid hostname", name, domain.name),
            ));
        }
    }

    if let Some(message) = key_length_problem(domain.key_length) {
        result.add_error(ValidationError::new(
            ErrorCategory::Key,
            format!("key-length for domain '{}': {}", domain.name, message),
        ));
    }

    match domain.challenge {
        ChallengeType::Http01 => {
            for name in domain.san_list() {
                if domain.acl_for(&name).is_none() {
                    result.add_error(ValidationError::new(
                        ErrorCategory::Challenge,
                        format!(
                            "Domain '{}' uses http-01 but has no ACL entry for '{}'",
                            domain.name, name
                        ),
                    ));
                }
            }
        }
        ChallengeType::Dns01 => {
            if domain.dns_hooks.add.as_deref().map_or(true, str::is_empty) {
                result.add_error(ValidationError::new(
                    ErrorCategory::Challenge,
                    format!("Domain '{}' uses dns-01 but has no 'add' hook", domain.name),
                ));
            }
            if domain.dns_hooks.delete.as_deref().map_or(true, str::is_empty) {
                result.add_error(ValidationError::new(
                    ErrorCategory::Challenge,
                    format!("Domain '{}' uses dns-01 but has no 'delete' hook", domain.name),
                ));
            }
        }
    }

    result
}

fn key_length_problem(bits: u32) -> Option<String> {
    if !(MIN_KEY_LENGTH..=MAX_KEY_LENGTH).contains(&bits) {
        Some(format!(
            "{} bits is outside {}..={}",
            bits, MIN_KEY_LENGTH, MAX_KEY_LENGTH
        ))
    } else if bits % 8 != 0 {
        Some(format!("{} bits is not a whole number of bytes", bits))
    } else {
        None
    }
}

fn is_valid_hostname(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}
