//! Per-run context and capabilities
//!
//! A [`RunContext`] carries everything one domain's run needs to know
//! (settings, the domain entry, derived paths, run ID). [`Capabilities`]
//! carries everything it needs to *do*: HTTP, DNS, remote hosts, time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use certsmith_common::RunId;
use certsmith_config::{AcmeSettings, DomainConfig};

use crate::acme::clock::{Clock, PollPolicy, Sleeper, SystemClock, ThreadSleeper};
use crate::acme::hooks::DnsHook;
use crate::acme::resolver::{DnsResolver, HickoryDnsResolver};
use crate::acme::transport::{HttpTransport, ReqwestTransport};
use crate::acme::AcmeError;
use crate::sink::{RemoteTransfer, SshTransfer};

/// File names of one domain inside the working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPaths {
    pub dir: PathBuf,
    pub key: PathBuf,
    pub csr: PathBuf,
    pub certificate: PathBuf,
    pub chain: PathBuf,
    pub full_chain: PathBuf,
}

impl DomainPaths {
    pub fn new(working_dir: &Path, domain: &str) -> Self {
        let dir = working_dir.join(domain);
        Self {
            key: dir.join(format!("{}.key", domain)),
            csr: dir.join(format!("{}.csr", domain)),
            certificate: dir.join(format!("{}.crt", domain)),
            chain: dir.join("chain.crt"),
            full_chain: dir.join(format!("{}.fullchain.crt", domain)),
            dir,
        }
    }
}

/// What one run knows
#[derive(Debug, Clone)]
pub struct RunContext<'a> {
    pub run_id: RunId,
    pub settings: &'a AcmeSettings,
    pub domain: &'a DomainConfig,
    pub paths: DomainPaths,
    /// Skip the renewal gate
    pub force: bool,
}

impl<'a> RunContext<'a> {
    pub fn new(settings: &'a AcmeSettings, domain: &'a DomainConfig, force: bool) -> Self {
        Self {
            run_id: RunId::new(),
            paths: DomainPaths::new(&settings.working_dir, &domain.name),
            settings,
            domain,
            force,
        }
    }

    /// Primary domain first, then aliases
    pub fn names(&self) -> Vec<String> {
        self.domain.san_list()
    }

    /// Challenge status polling: fixed interval, no attempt bound
    pub fn status_poll(&self) -> PollPolicy {
        PollPolicy::unbounded(Duration::from_secs(self.settings.poll_interval_secs))
    }

    /// DNS propagation checks: fixed interval, bounded attempts
    pub fn dns_poll(&self) -> PollPolicy {
        PollPolicy::bounded(
            Duration::from_secs(self.settings.dns_interval_secs),
            self.settings.dns_attempts,
        )
    }
}

/// What one run can do
#[derive(Clone)]
pub struct Capabilities {
    pub http: Arc<dyn HttpTransport>,
    pub resolver: Arc<dyn DnsResolver>,
    pub remote: Arc<dyn RemoteTransfer>,
    pub clock: Arc<dyn Clock>,
    pub sleeper: Arc<dyn Sleeper>,
    /// Replaces the configured DNS hook commands when set
    pub dns_hook: Option<Arc<dyn DnsHook>>,
}

impl Capabilities {
    /// Production capabilities: reqwest, hickory, scp/ssh, wall clock
    pub fn system() -> Result<Self, AcmeError> {
        Ok(Self {
            http: Arc::new(ReqwestTransport::new()?),
            resolver: Arc::new(HickoryDnsResolver::new()?),
            remote: Arc::new(SshTransfer::new()),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(ThreadSleeper),
            dns_hook: None,
        })
    }

    pub fn with_dns_hook(mut self, hook: Arc<dyn DnsHook>) -> Self {
        self.dns_hook = Some(hook);
        self
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("dns_hook_override", &self.dns_hook.is_some())
            .finish_non_exhaustive()
    }
}
