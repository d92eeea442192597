//! Renewal decision, issuance and certificate files

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::client::AcmeClient;
use super::clock::Clock;
use super::error::AcmeError;
use super::keystore::CertificateRequest;
use crate::context::DomainPaths;

const CERTIFICATE_PEM_TAG: &str = "CERTIFICATE";

/// Wrap DER as a PEM `CERTIFICATE` block with LF line endings
pub fn certificate_pem(der: &[u8]) -> String {
    pem::encode_config(
        &pem::Pem::new(CERTIFICATE_PEM_TAG, der.to_vec()),
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Validity period of a PEM or DER certificate
pub fn validity(bytes: &[u8]) -> Result<(DateTime<Utc>, DateTime<Utc>), AcmeError> {
    let der = match pem::parse(bytes) {
        Ok(block) => block.into_contents(),
        Err(_) => bytes.to_vec(),
    };
    let (_, cert) = x509_parser::parse_x509_certificate(&der)
        .map_err(|e| AcmeError::Crypto(format!("invalid X.509 certificate: {}", e)))?;

    let to_utc = |ts: i64| {
        DateTime::<Utc>::from_timestamp(ts, 0)
            .ok_or_else(|| AcmeError::Crypto(format!("certificate timestamp {} out of range", ts)))
    };
    Ok((
        to_utc(cert.validity().not_before.timestamp())?,
        to_utc(cert.validity().not_after.timestamp())?,
    ))
}

// ============================================================================
// Certificates
// ============================================================================

/// The certificate currently on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingCertificate {
    pub path: PathBuf,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl ExistingCertificate {
    /// `<name>_<not before>_<not after>` next to the certificate
    pub fn backup_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!(
            "{}_{}_{}",
            name,
            self.not_before.format("%Y-%m-%d"),
            self.not_after.format("%Y-%m-%d")
        ))
    }
}

/// Leaf and issuer returned by the CA
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub leaf_der: Vec<u8>,
    pub issuer_der: Vec<u8>,
    pub not_after: DateTime<Utc>,
}

impl IssuedCertificate {
    pub fn certificate_pem(&self) -> String {
        certificate_pem(&self.leaf_der)
    }

    pub fn chain_pem(&self) -> String {
        certificate_pem(&self.issuer_der)
    }

    /// Leaf followed by the intermediate
    pub fn full_chain_pem(&self) -> String {
        format!("{}{}", self.certificate_pem(), self.chain_pem())
    }
}

/// Whether a run should issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalDecision {
    /// The current certificate is outside the renewal window
    NotDue { not_after: DateTime<Utc> },
    /// Issue; `existing` is backed up once the new certificate arrives
    Due { existing: Option<ExistingCertificate> },
}

// ============================================================================
// Manager
// ============================================================================

/// Owns the certificate files of one domain
pub struct CertificateManager<'a> {
    paths: &'a DomainPaths,
    clock: &'a dyn Clock,
    renew_allow_days: u32,
}

impl<'a> CertificateManager<'a> {
    pub fn new(paths: &'a DomainPaths, clock: &'a dyn Clock, renew_allow_days: u32) -> Self {
        Self {
            paths,
            clock,
            renew_allow_days,
        }
    }

    /// Load `<domain>.crt` if present
    pub fn existing(&self) -> Result<Option<ExistingCertificate>, AcmeError> {
        let path = &self.paths.certificate;
        if !path.exists() {
            return Ok(None);
        }
        let (not_before, not_after) = validity(&fs::read(path)?).map_err(|e| {
            AcmeError::Crypto(format!("existing certificate {}: {}", path.display(), e))
        })?;
        Ok(Some(ExistingCertificate {
            path: path.clone(),
            not_before,
            not_after,
        }))
    }

    /// Renewal gate: not due while `now + renew_allow_days < notAfter`
    pub fn renewal_decision(&self, force: bool) -> Result<RenewalDecision, AcmeError> {
        let existing = self.existing()?;

        if let Some(cert) = &existing {
            let window_end = self.clock.now() + Duration::days(i64::from(self.renew_allow_days));
            if window_end < cert.not_after && !force {
                info!(
                    path = %cert.path.display(),
                    not_after = %cert.not_after,
                    renew_allow_days = self.renew_allow_days,
                    "Certificate not due for renewal"
                );
                return Ok(RenewalDecision::NotDue {
                    not_after: cert.not_after,
                });
            }
            info!(not_after = %cert.not_after, force, "Certificate due for renewal");
        }

        Ok(RenewalDecision::Due { existing })
    }

    /// Submit the CSR and collect the leaf and issuer
    pub fn issue(
        &self,
        client: &AcmeClient,
        csr: &CertificateRequest,
    ) -> Result<IssuedCertificate, AcmeError> {
        let der = client.new_certificate(csr.der())?;
        let (_, not_after) = validity(&der.leaf)?;
        validity(&der.issuer)?;

        info!(not_after = %not_after, "Received certificate");
        Ok(IssuedCertificate {
            leaf_der: der.leaf,
            issuer_der: der.issuer,
            not_after,
        })
    }

    /// Back up the previous certificate and write the new artifacts
    ///
    /// All three files are staged before the old certificate is moved, so a
    /// failed write leaves it in place.
    pub fn store(
        &self,
        issued: &IssuedCertificate,
        existing: Option<&ExistingCertificate>,
    ) -> Result<(), AcmeError> {
        let certificate = stage(&self.paths.certificate, issued.certificate_pem().as_bytes())?;
        let chain = stage(&self.paths.chain, issued.chain_pem().as_bytes())?;
        let full_chain = stage(&self.paths.full_chain, issued.full_chain_pem().as_bytes())?;

        if let Some(old) = existing {
            let backup = old.backup_path();
            fs::rename(&old.path, &backup)?;
            if let Err(e) = certificate.persist(&self.paths.certificate) {
                let _ = fs::rename(&backup, &old.path);
                return Err(e.into());
            }
            info!(backup = %backup.display(), "Backed up previous certificate");
        } else {
            certificate.persist(&self.paths.certificate)?;
        }
        chain.persist(&self.paths.chain)?;
        full_chain.persist(&self.paths.full_chain)?;

        debug!(
            certificate = %self.paths.certificate.display(),
            chain = %self.paths.chain.display(),
            full_chain = %self.paths.full_chain.display(),
            "Wrote certificate files"
        );
        Ok(())
    }
}

/// Fill a temporary file next to `path`; persisting it is a rename
fn stage(path: &Path, contents: &[u8]) -> Result<tempfile::NamedTempFile, AcmeError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::testing::FixedClock;
    use chrono::{Datelike, TimeZone};
    use tempfile::TempDir;

    fn rcgen_cert(not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Vec<u8> {
        let ymd = |t: DateTime<Utc>| rcgen::date_time_ymd(t.year(), t.month() as u8, t.day() as u8);
        let mut params = rcgen::CertificateParams::new(vec!["example.com".to_string()]).unwrap();
        params.not_before = ymd(not_before);
        params.not_after = ymd(not_after);
        let key = rcgen::KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().to_vec()
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn setup_paths() -> (TempDir, DomainPaths) {
        let temp_dir = TempDir::new().unwrap();
        let paths = DomainPaths::new(temp_dir.path(), "example.com");
        fs::create_dir_all(&paths.dir).unwrap();
        (temp_dir, paths)
    }

    #[test]
    fn test_no_certificate_is_due() {
        let (_temp_dir, paths) = setup_paths();
        let clock = FixedClock(day(2026, 1, 1));
        let manager = CertificateManager::new(&paths, &clock, 30);
        assert_eq!(
            manager.renewal_decision(false).unwrap(),
            RenewalDecision::Due { existing: None }
        );
    }

    #[test]
    fn test_renewal_gate() {
        let (_temp_dir, paths) = setup_paths();
        let not_after = day(2026, 3, 1);
        fs::write(&paths.certificate, certificate_pem(&rcgen_cert(day(2025, 12, 1), not_after))).unwrap();

        // 59 days left, window of 30: not due
        let early = FixedClock(day(2026, 1, 1));
        let manager = CertificateManager::new(&paths, &early, 30);
        assert_eq!(
            manager.renewal_decision(false).unwrap(),
            RenewalDecision::NotDue { not_after }
        );
        assert!(matches!(
            manager.renewal_decision(true).unwrap(),
            RenewalDecision::Due { existing: Some(_) }
        ));

        // exactly on the boundary: due
        let boundary = FixedClock(day(2026, 1, 30));
        let manager = CertificateManager::new(&paths, &boundary, 30);
        assert!(matches!(
            manager.renewal_decision(false).unwrap(),
            RenewalDecision::Due { existing: Some(_) }
        ));
    }

    #[test]
    fn test_unparseable_certificate_is_fatal() {
        let (_temp_dir, paths) = setup_paths();
        fs::write(&paths.certificate, "garbage").unwrap();
        let clock = FixedClock(day(2026, 1, 1));
        let err = CertificateManager::new(&paths, &clock, 30)
            .renewal_decision(false)
            .unwrap_err();
        assert_eq!(err.kind(), "crypto");
    }

    #[test]
    fn test_store_backs_up_and_writes_chain() {
        let (_temp_dir, paths) = setup_paths();
        let old = rcgen_cert(day(2025, 12, 1), day(2026, 3, 1));
        fs::write(&paths.certificate, certificate_pem(&old)).unwrap();

        let clock = FixedClock(day(2026, 2, 15));
        let manager = CertificateManager::new(&paths, &clock, 30);
        let RenewalDecision::Due { existing } = manager.renewal_decision(false).unwrap() else {
            panic!("expected renewal to be due");
        };

        let issued = IssuedCertificate {
            leaf_der: rcgen_cert(day(2026, 2, 15), day(2026, 5, 16)),
            issuer_der: rcgen_cert(day(2020, 1, 1), day(2030, 1, 1)),
            not_after: day(2026, 5, 16),
        };
        manager.store(&issued, existing.as_ref()).unwrap();

        let backup = paths.dir.join("example.com.crt_2025-12-01_2026-03-01");
        assert_eq!(fs::read_to_string(&backup).unwrap(), certificate_pem(&old));
        assert_eq!(fs::read_to_string(&paths.certificate).unwrap(), issued.certificate_pem());
        assert_eq!(fs::read_to_string(&paths.chain).unwrap(), issued.chain_pem());

        let full_chain = fs::read_to_string(&paths.full_chain).unwrap();
        assert_eq!(full_chain.matches("-----BEGIN CERTIFICATE-----").count(), 2);
        assert!(full_chain.starts_with(&issued.certificate_pem()));
    }

    #[test]
    fn test_failed_write_keeps_previous_certificate() {
        let (_temp_dir, mut paths) = setup_paths();
        let old = rcgen_cert(day(2025, 12, 1), day(2026, 3, 1));
        fs::write(&paths.certificate, certificate_pem(&old)).unwrap();
        paths.full_chain = paths.dir.join("missing/example.com.fullchain.crt");

        let clock = FixedClock(day(2026, 2, 15));
        let manager = CertificateManager::new(&paths, &clock, 30);
        let RenewalDecision::Due { existing } = manager.renewal_decision(false).unwrap() else {
            panic!("expected renewal to be due");
        };

        let issued = IssuedCertificate {
            leaf_der: rcgen_cert(day(2026, 2, 15), day(2026, 5, 16)),
            issuer_der: rcgen_cert(day(2020, 1, 1), day(2030, 1, 1)),
            not_after: day(2026, 5, 16),
        };
        let err = manager.store(&issued, existing.as_ref()).unwrap_err();
        assert_eq!(err.kind(), "io");

        assert_eq!(fs::read_to_string(&paths.certificate).unwrap(), certificate_pem(&old));
        assert!(!paths.dir.join("example.com.crt_2025-12-01_2026-03-01").exists());
        assert!(!paths.chain.exists());
        let leftovers: Vec<_> = fs::read_dir(&paths.dir).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_validity_accepts_pem_and_der() {
        let der = rcgen_cert(day(2026, 1, 1), day(2026, 4, 1));
        let (from_der, _) = validity(&der).unwrap();
        let (from_pem, until) = validity(certificate_pem(&der).as_bytes()).unwrap();
        assert_eq!(from_der, day(2026, 1, 1));
        assert_eq!(from_pem, from_der);
        assert_eq!(until, day(2026, 4, 1));
    }
}
