//! Certificate validation
//!
//! Inspects certificates already issued into the working directory and
//! reports ones that cannot be parsed or are due for renewal.

use super::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};
use crate::{Config, DomainConfig};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

/// Validate the certificates of every configured domain against `now`
pub fn validate_certificates(config: &Config, now: DateTime<Utc>) -> ValidationResult {
    let mut result = ValidationResult::new();

    for domain in &config.domains {
        let cert_path = domain
            .domain_dir(&config.acme.working_dir)
            .join(format!("{}.crt", domain.name));

        if !cert_path.exists() {
            continue;
        }

        match load_and_check_cert(&cert_path, domain, now) {
            Ok(Some(warning)) => result.add_warning(warning),
            Ok(None) => {}
            Err(e) => result.add_error(e),
        }
    }

    result
}

/// Load a certificate and check its expiry against the renewal window
fn load_and_check_cert(
    cert_path: &Path,
    domain: &DomainConfig,
    now: DateTime<Utc>,
) -> Result<Option<ValidationWarning>, ValidationError> {
    let cert_pem = std::fs::read(cert_path).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Failed to read certificate {:?}: {}", cert_path, e),
        )
    })?;

    let pem = pem::parse(&cert_pem).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Failed to parse certificate {:?}: {}", cert_path, e),
        )
    })?;

    let (_, cert) = x509_parser::parse_x509_certificate(pem.contents()).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Invalid X509 certificate {:?}: {}", cert_path, e),
        )
    })?;

    let not_after = DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| {
            ValidationError::new(
                ErrorCategory::Certificate,
                format!("Certificate {:?} has an out-of-range expiry", cert_path),
            )
        })?;

    if not_after < now {
        return Ok(Some(ValidationWarning::new(format!(
            "Certificate for '{}' expired at {}",
            domain.name, not_after
        ))));
    }

    if now + Duration::days(i64::from(domain.renew_allow_days)) >= not_after {
        return Ok(Some(ValidationWarning::new(format!(
            "Certificate for '{}' expires at {} and is due for renewal",
            domain.name, not_after
        ))));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AcmeSettings;
    use tempfile::TempDir;

    fn write_cert(dir: &Path, domain: &str, days_valid: i64) {
        let mut params = rcgen::CertificateParams::new(vec![domain.to_string()]).unwrap();
        let now = rcgen::date_time_ymd(2026, 1, 1);
        params.not_before = now;
        params.not_after = now + std::time::Duration::from_secs(days_valid as u64 * 86_400);
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();

        let domain_dir = dir.join(domain);
        std::fs::create_dir_all(&domain_dir).unwrap();
        std::fs::write(domain_dir.join(format!("{}.crt", domain)), cert.pem()).unwrap();
    }

    fn config_for(dir: &TempDir, domain: &str) -> Config {
        Config {
            acme: AcmeSettings {
                working_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
            domains: vec![DomainConfig::new(domain)],
        }
    }

    fn jan_first_plus(days: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::days(days)
    }

    #[test]
    fn test_missing_certificate_is_fine() {
        let dir = TempDir::new().unwrap();
        let result = validate_certificates(&config_for(&dir, "example.com"), Utc::now());
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_certificate_not_due() {
        let dir = TempDir::new().unwrap();
        write_cert(dir.path(), "example.com", 90);

        let result = validate_certificates(&config_for(&dir, "example.com"), jan_first_plus(10));
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_certificate_due_for_renewal() {
        let dir = TempDir::new().unwrap();
        write_cert(dir.path(), "example.com", 90);

        let result = validate_certificates(&config_for(&dir, "example.com"), jan_first_plus(70));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].message.contains("due for renewal"));

        let result = validate_certificates(&config_for(&dir, "example.com"), jan_first_plus(100));
        assert!(result.warnings[0].message.contains("expired at"));
    }

    #[test]
    fn test_unparseable_certificate() {
        let dir = TempDir::new().unwrap();
        let domain_dir = dir.path().join("example.com");
        std::fs::create_dir_all(&domain_dir).unwrap();
        std::fs::write(domain_dir.join("example.com.crt"), "garbage").unwrap();

        let result = validate_certificates(&config_for(&dir, "example.com"), Utc::now());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].category, ErrorCategory::Certificate);
    }
}
