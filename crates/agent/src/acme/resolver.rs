//! DNS lookups for DNS-01 propagation checks
//!
//! The TXT query goes straight to the zone's authoritative nameserver with
//! caching disabled, so a record added by the hook is seen as soon as the
//! primary serves it.

use std::net::IpAddr;

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::Resolver;
use tracing::{debug, trace, warn};

use super::error::AcmeError;

/// Resolves nameservers and queries them directly
pub trait DnsResolver: Send + Sync {
    /// Address of an authoritative nameserver for `domain`'s zone
    fn authoritative_nameserver(&self, domain: &str) -> Result<IpAddr, AcmeError>;

    /// TXT strings at `name`, asked of `nameserver` only
    fn txt_records(&self, nameserver: IpAddr, name: &str) -> Result<Vec<String>, AcmeError>;
}

/// `hickory-resolver` backed lookups
pub struct HickoryDnsResolver {
    system: Resolver,
}

impl HickoryDnsResolver {
    /// Use the system resolver configuration, falling back to public defaults
    pub fn new() -> Result<Self, AcmeError> {
        let system = match Resolver::from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!(error = %e, "No usable system resolver configuration, using defaults");
                Resolver::new(ResolverConfig::default(), ResolverOpts::default())
                    .map_err(|e| AcmeError::Transport(format!("cannot build DNS resolver: {}", e)))?
            }
        };
        Ok(Self { system })
    }

    /// First NS name for `zone`, or None if the zone has no NS records
    fn ns_name(&self, zone: &str) -> Result<Option<String>, AcmeError> {
        match self.system.ns_lookup(fqdn(zone)) {
            Ok(lookup) => Ok(lookup.iter().next().map(|ns| ns.to_string())),
            Err(e) if is_no_records(&e) => Ok(None),
            Err(e) => Err(AcmeError::Transport(format!(
                "NS lookup for {} failed: {}",
                zone, e
            ))),
        }
    }
}

impl DnsResolver for HickoryDnsResolver {
    fn authoritative_nameserver(&self, domain: &str) -> Result<IpAddr, AcmeError> {
        // Walk up the labels until a zone apex answers with NS records
        let mut zone = domain.trim_end_matches('.');
        let ns = loop {
            if let Some(ns) = self.ns_name(zone)? {
                break ns;
            }
            match zone.split_once('.') {
                Some((_, parent)) if parent.contains('.') => zone = parent,
                _ => {
                    return Err(AcmeError::Transport(format!(
                        "no authoritative nameserver found for {}",
                        domain
                    )))
                }
            }
        };

        let address = self
            .system
            .lookup_ip(ns.as_str())
            .map_err(|e| AcmeError::Transport(format!("cannot resolve nameserver {}: {}", ns, e)))?
            .iter()
            .next()
            .ok_or_else(|| AcmeError::Transport(format!("nameserver {} has no address", ns)))?;

        debug!(domain = %domain, zone = %zone, nameserver = %ns, address = %address, "Authoritative nameserver");
        Ok(address)
    }

    fn txt_records(&self, nameserver: IpAddr, name: &str) -> Result<Vec<String>, AcmeError> {
        let group = NameServerConfigGroup::from_ips_clear(&[nameserver], 53, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let mut opts = ResolverOpts::default();
        opts.cache_size = 0;
        opts.attempts = 1;

        let direct = Resolver::new(config, opts)
            .map_err(|e| AcmeError::Transport(format!("cannot build DNS resolver: {}", e)))?;

        let records = match direct.txt_lookup(fqdn(name)) {
            Ok(lookup) => lookup
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|part| String::from_utf8_lossy(part))
                        .collect::<String>()
                })
                .collect(),
            Err(e) if is_no_records(&e) => Vec::new(),
            Err(e) => {
                return Err(AcmeError::Transport(format!(
                    "TXT lookup for {} at {} failed: {}",
                    name, nameserver, e
                )))
            }
        };

        trace!(name = %name, nameserver = %nameserver, records = ?records, "TXT lookup");
        Ok(records)
    }
}

fn is_no_records(error: &ResolveError) -> bool {
    matches!(error.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

/// Absolute name, so search domains are never appended
fn fqdn(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.'))
}
