//! Certsmith configuration
//!
//! Loads the KDL configuration consumed by the ACME agent: the CA endpoint and
//! account settings, plus one block per certificate (primary domain, aliases,
//! challenge publication targets, DNS hooks and deployment destinations).
//!
//! # Example
//!
//! ```kdl
//! acme {
//!     ca "https://acme-staging.api.letsencrypt.org"
//!     email "admin@example.com"
//!     working-dir "/var/lib/certsmith"
//! }
//!
//! domain "example.com" {
//!     aliases "www.example.com"
//!     challenge "http-01"
//!     acl {
//!         "example.com" "/var/www/html/.well-known/acme-challenge"
//!         "www.example.com" "ssh:web1:/var/www/html/.well-known/acme-challenge"
//!     }
//!     deploy {
//!         cert "/etc/ssl/example.com.crt"
//!         reload "systemctl reload nginx"
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use certsmith_common::{ChallengeType, Destination, ReloadCommand};

pub mod kdl;
pub mod validate;

pub use validate::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};

// ============================================================================
// Defaults
// ============================================================================

/// Let's Encrypt staging endpoint speaking the v1 protocol dialect
pub const DEFAULT_CA: &str = "https://acme-staging.api.letsencrypt.org";

/// Subscriber agreement accepted on registration
pub const DEFAULT_AGREEMENT: &str =
    "https://letsencrypt.org/documents/LE-SA-v1.1.1-August-1-2016.pdf";

pub(crate) fn default_ca() -> String {
    DEFAULT_CA.to_string()
}
pub(crate) fn default_agreement() -> String {
    DEFAULT_AGREEMENT.to_string()
}
pub(crate) fn default_key_length() -> u32 {
    4096
}
pub(crate) fn default_working_dir() -> PathBuf {
    PathBuf::from(".certsmith")
}
pub(crate) fn default_poll_interval_secs() -> u64 {
    5
}
pub(crate) fn default_dns_attempts() -> u32 {
    5
}
pub(crate) fn default_dns_interval_secs() -> u64 {
    2
}
pub(crate) fn default_renew_allow_days() -> u32 {
    30
}

// ============================================================================
// Configuration Model
// ============================================================================

/// Complete agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// CA endpoint and account settings
    #[serde(default)]
    pub acme: AcmeSettings,

    /// Certificates to manage, one per primary domain
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
}

/// CA endpoint, account and polling settings shared by every domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeSettings {
    /// CA base URL; protocol endpoints are resolved under it
    #[serde(default = "default_ca")]
    pub ca: String,

    /// Subscriber agreement URL sent with the registration
    #[serde(default = "default_agreement")]
    pub agreement: String,

    /// Account contact email
    #[serde(default)]
    pub email: Option<String>,

    /// Account RSA key length in bits
    #[serde(default = "default_key_length")]
    pub account_key_length: u32,

    /// Directory holding `account.key` and one subdirectory per domain
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Delay between challenge status polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Lookups against the authoritative nameserver before giving up
    #[serde(default = "default_dns_attempts")]
    pub dns_attempts: u32,

    /// Delay between DNS propagation lookups
    #[serde(default = "default_dns_interval_secs")]
    pub dns_interval_secs: u64,
}

impl Default for AcmeSettings {
    fn default() -> Self {
        Self {
            ca: default_ca(),
            agreement: default_agreement(),
            email: None,
            account_key_length: default_key_length(),
            working_dir: default_working_dir(),
            poll_interval_secs: default_poll_interval_secs(),
            dns_attempts: default_dns_attempts(),
            dns_interval_secs: default_dns_interval_secs(),
        }
    }
}

impl AcmeSettings {
    /// Path of the shared account key
    pub fn account_key_path(&self) -> PathBuf {
        self.working_dir.join("account.key")
    }
}

/// One managed certificate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Primary domain; names the certificate files
    pub name: String,

    /// Additional SAN entries
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Domain RSA key length in bits
    #[serde(default = "default_key_length")]
    pub key_length: u32,

    /// Reissue once the certificate expires within this many days
    #[serde(default = "default_renew_allow_days")]
    pub renew_allow_days: u32,

    /// Validation method for every name in the SAN list
    #[serde(default)]
    pub challenge: ChallengeType,

    /// HTTP-01 publication directory per SAN entry
    #[serde(default)]
    pub acl: BTreeMap<String, Destination>,

    /// DNS-01 record hooks
    #[serde(default)]
    pub dns_hooks: DnsHooks,

    /// Where finished artifacts are copied
    #[serde(default)]
    pub deploy: DeployConfig,
}

impl DomainConfig {
    /// Create a domain entry with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            key_length: default_key_length(),
            renew_allow_days: default_renew_allow_days(),
            challenge: ChallengeType::default(),
            acl: BTreeMap::new(),
            dns_hooks: DnsHooks::default(),
            deploy: DeployConfig::default(),
        }
    }

    /// Primary domain followed by aliases, without duplicates
    pub fn san_list(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        for alias in &self.aliases {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(alias)) {
                names.push(alias.clone());
            }
        }
        names
    }

    /// HTTP-01 publication directory for a SAN entry
    pub fn acl_for(&self, name: &str) -> Option<&Destination> {
        self.acl.get(name).or_else(|| {
            self.acl
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    /// Per-domain directory holding keys, CSR and certificates
    pub fn domain_dir(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.name)
    }
}

/// External commands that add and delete the `_acme-challenge` TXT record.
///
/// Each command is invoked as `<command> <domain> <value>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsHooks {
    #[serde(default)]
    pub add: Option<String>,
    #[serde(default)]
    pub delete: Option<String>,
}

/// Deployment destinations for the finished artifacts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub cert: Option<Destination>,
    #[serde(default)]
    pub key: Option<Destination>,
    #[serde(default)]
    pub chain: Option<Destination>,
    #[serde(default)]
    pub fullchain: Option<Destination>,
    #[serde(default)]
    pub reload: Option<ReloadCommand>,
}

impl DeployConfig {
    /// True when no destination and no reload command is configured
    pub fn is_empty(&self) -> bool {
        self.cert.is_none()
            && self.key.is_none()
            && self.chain.is_none()
            && self.fullchain.is_none()
            && self.reload.is_none()
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Load configuration from a KDL file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        let config = Self::from_kdl_str(&content, &path.display().to_string())?;

        info!(
            path = %path.display(),
            domains = config.domains.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration from KDL text; `source_name` labels diagnostics
    pub fn from_kdl_str(content: &str, source_name: &str) -> Result<Self> {
        let config = crate::kdl::parse_document(content, source_name)?;
        debug!(
            ca = %config.acme.ca,
            domains = config.domains.len(),
            "Parsed KDL configuration"
        );
        Ok(config)
    }

    /// Look up a configured domain by its primary name
    pub fn domain(&self, name: &str) -> Option<&DomainConfig> {
        self.domains
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> ValidationResult {
        validate::validate_config(self)
    }
}
