//! Configuration linting for best practices
//!
//! Checks configuration for missing best practices and potential issues.

use certsmith_common::ChallengeType;

use super::{ValidationResult, ValidationWarning};
use crate::Config;

/// Certificates from the default CA are valid for 90 days
const CERTIFICATE_LIFETIME_DAYS: u32 = 90;

/// Lint configuration for best practices
pub fn lint_config(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.acme.email.is_none() {
        result.add_warning(ValidationWarning::new(
            "No account email configured (expiry notices from the CA will not reach anyone)",
        ));
    }

    if config.domains.is_empty() {
        result.add_warning(ValidationWarning::new("No domains configured"));
    }

    for domain in &config.domains {
        if domain.renew_allow_days >= CERTIFICATE_LIFETIME_DAYS {
            result.add_warning(ValidationWarning::new(format!(
                "Domain '{}' renews {} days before expiry; every run will reissue",
                domain.name, domain.renew_allow_days
            )));
        }

        let sans = domain.san_list();
        for name in domain.acl.keys() {
            if !sans.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                result.add_warning(ValidationWarning::new(format!(
                    "Domain '{}' has an ACL entry for '{}' which is not in its SAN list",
                    domain.name, name
                )));
            }
        }

        if domain.challenge == ChallengeType::Dns01 && !domain.acl.is_empty() {
            result.add_warning(ValidationWarning::new(format!(
                "Domain '{}' uses dns-01; its ACL entries are ignored",
                domain.name
            )));
        }

        if domain.deploy.is_empty() {
            result.add_warning(ValidationWarning::new(format!(
                "Domain '{}' has no deploy destinations; certificates stay in the working directory",
                domain.name
            )));
        }
    }

    result
}
