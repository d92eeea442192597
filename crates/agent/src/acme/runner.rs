//! One issuance run per domain
//!
//! Ties the components together in order: renewal gate, configuration
//! preflight, keys and CSR, registration, authorizations, issuance, files,
//! deployment. Any error aborts the run; there is no partial success.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, info_span};

use certsmith_common::ChallengeType;
use certsmith_config::Config;

use super::certificate::{CertificateManager, RenewalDecision};
use super::challenge::{ChallengeFulfillment, Dns01Challenge, Http01Challenge};
use super::client::AcmeClient;
use super::error::AcmeError;
use super::hooks::{CommandHook, DnsHook};
use super::jws::RequestSigner;
use super::keystore::KeyStore;
use super::orchestrator::AuthorizationOrchestrator;
use super::transport::AcmeTransport;
use crate::context::{Capabilities, RunContext};
use crate::deploy::Deployer;
use crate::signals::CleanupRegistry;
use crate::sink::ArtifactSink;

/// How a run ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A new certificate was written
    Issued {
        certificate: PathBuf,
        chain: PathBuf,
        full_chain: PathBuf,
        not_after: DateTime<Utc>,
    },
    /// The current certificate is outside the renewal window
    NotDue { not_after: DateTime<Utc> },
}

/// Issue or renew the certificate of one domain
pub struct IssuanceRun<'a> {
    ctx: RunContext<'a>,
    caps: &'a Capabilities,
    cleanup: &'a CleanupRegistry,
}

impl<'a> IssuanceRun<'a> {
    pub fn new(ctx: RunContext<'a>, caps: &'a Capabilities, cleanup: &'a CleanupRegistry) -> Self {
        Self { ctx, caps, cleanup }
    }

    pub fn execute(&self) -> Result<RunOutcome, AcmeError> {
        let span = info_span!(
            "run",
            run_id = %self.ctx.run_id.short(),
            domain = %self.ctx.domain.name
        );
        let _enter = span.enter();

        let settings = self.ctx.settings;
        let domain = self.ctx.domain;
        let paths = &self.ctx.paths;
        let names = self.ctx.names();

        let keystore = KeyStore::new(&settings.working_dir)?;
        fs::create_dir_all(&paths.dir).map_err(|e| {
            AcmeError::Configuration(format!("cannot create {}: {}", paths.dir.display(), e))
        })?;

        // Gate first: a run with nothing to do touches no key material
        let manager =
            CertificateManager::new(paths, self.caps.clock.as_ref(), domain.renew_allow_days);
        let existing = match manager.renewal_decision(self.ctx.force)? {
            RenewalDecision::NotDue { not_after } => return Ok(RunOutcome::NotDue { not_after }),
            RenewalDecision::Due { existing } => existing,
        };

        info!(names = ?names, challenge = %domain.challenge, "Starting issuance");

        let scratch = tempfile::Builder::new()
            .prefix(".challenge-")
            .tempdir_in(&paths.dir)?;
        let _cleanup_guard = self.cleanup.register(scratch.path());

        let sink = ArtifactSink::new(self.caps.remote.clone());
        let hook: Option<Arc<dyn DnsHook>> = match domain.challenge {
            ChallengeType::Http01 => None,
            ChallengeType::Dns01 => Some(match &self.caps.dns_hook {
                Some(hook) => hook.clone(),
                None => Arc::new(CommandHook::from_config(&domain.dns_hooks, &domain.name)?),
            }),
        };
        let strategy: Box<dyn ChallengeFulfillment + '_> = match &hook {
            None => Box::new(Http01Challenge::new(
                domain,
                scratch.path(),
                &sink,
                self.caps.http.as_ref(),
            )),
            Some(hook) => Box::new(Dns01Challenge::new(
                hook.as_ref(),
                self.caps.resolver.as_ref(),
                self.caps.sleeper.as_ref(),
                self.ctx.dns_poll(),
            )),
        };

        names.iter().try_for_each(|name| strategy.preflight(name))?;

        let account_key = keystore.load_or_create_account_key(settings.account_key_length)?;
        let transport = AcmeTransport::new(
            self.caps.http.clone(),
            RequestSigner::new(Arc::new(account_key)),
            &settings.ca,
        );
        let client = AcmeClient::new(transport, &settings.ca)?;
        let orchestrator = AuthorizationOrchestrator::new(
            &client,
            strategy.as_ref(),
            self.caps.sleeper.as_ref(),
            self.ctx.status_poll(),
        );

        let (domain_key, key_is_new) =
            keystore.load_or_create_domain_key(&paths.key, domain.key_length)?;
        let csr = keystore.load_or_create_csr(&paths.csr, &domain_key, key_is_new, &names)?;

        client.register(settings.email.as_deref(), &settings.agreement)?;
        orchestrator.authorize_all(&names)?;

        let issued = manager.issue(&client, &csr)?;
        manager.store(&issued, existing.as_ref())?;

        if !domain.deploy.is_empty() {
            let copied = Deployer::new(sink.clone()).deploy(&domain.deploy, paths)?;
            info!(copied, "Deployment complete");
        }

        info!(not_after = %issued.not_after, "Certificate issued");
        Ok(RunOutcome::Issued {
            certificate: paths.certificate.clone(),
            chain: paths.chain.clone(),
            full_chain: paths.full_chain.clone(),
            not_after: issued.not_after,
        })
    }
}

/// Run the named domains one after another, stopping at the first failure
pub fn run_domains(
    config: &Config,
    names: &[String],
    force: bool,
    caps: &Capabilities,
    cleanup: &CleanupRegistry,
) -> Result<Vec<(String, RunOutcome)>, AcmeError> {
    let domains = names
        .iter()
        .map(|name| {
            config.domain(name).ok_or_else(|| {
                AcmeError::Configuration(format!("domain '{}' is not configured", name))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut outcomes = Vec::with_capacity(domains.len());
    for domain in domains {
        let ctx = RunContext::new(&config.acme, domain, force);
        let outcome = IssuanceRun::new(ctx, caps, cleanup).execute()?;
        outcomes.push((domain.name.clone(), outcome));
    }
    Ok(outcomes)
}
