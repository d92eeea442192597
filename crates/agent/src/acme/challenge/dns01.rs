//! DNS-01: a TXT record at `_acme-challenge.<domain>`

use certsmith_common::ChallengeType;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{ChallengeFulfillment, PublishedProof};
use crate::acme::clock::{PollPolicy, Sleeper};
use crate::acme::error::AcmeError;
use crate::acme::hooks::DnsHook;
use crate::acme::jws::b64url;
use crate::acme::resolver::DnsResolver;

/// Label prepended to the domain for the TXT record
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// `base64url(sha256(keyAuthorization))`
pub fn dns_txt_value(key_authorization: &str) -> String {
    b64url(Sha256::digest(key_authorization.as_bytes()))
}

/// Adds the record through the hook, then asks the authoritative
/// nameserver directly until the value shows up or the attempts run out.
pub struct Dns01Challenge<'a> {
    hook: &'a dyn DnsHook,
    resolver: &'a dyn DnsResolver,
    sleeper: &'a dyn Sleeper,
    policy: PollPolicy,
}

impl<'a> Dns01Challenge<'a> {
    pub fn new(
        hook: &'a dyn DnsHook,
        resolver: &'a dyn DnsResolver,
        sleeper: &'a dyn Sleeper,
        policy: PollPolicy,
    ) -> Self {
        Self {
            hook,
            resolver,
            sleeper,
            policy,
        }
    }

    fn await_propagation(&self, domain: &str, value: &str) -> Result<(), AcmeError> {
        let record = format!("{}.{}", ACME_CHALLENGE_LABEL, domain);
        let nameserver = self.resolver.authoritative_nameserver(domain)?;

        let mut attempt = 1;
        loop {
            match self.resolver.txt_records(nameserver, &record) {
                Ok(values) if values.iter().any(|v| v == value) => {
                    info!(domain = %domain, nameserver = %nameserver, attempt, "TXT record visible");
                    return Ok(());
                }
                Ok(values) => {
                    debug!(domain = %domain, attempt, seen = ?values, "TXT record not visible yet");
                }
                Err(e) => {
                    warn!(domain = %domain, attempt, error = %e, "TXT lookup failed");
                }
            }

            if !self.policy.allows_retry_after(attempt) {
                return Err(AcmeError::validation(
                    domain,
                    format!(
                        "{} TXT never showed the expected value at {} after {} attempts",
                        record, nameserver, attempt
                    ),
                ));
            }
            self.sleeper.sleep(self.policy.interval);
            attempt += 1;
        }
    }
}

impl ChallengeFulfillment for Dns01Challenge<'_> {
    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Dns01
    }

    fn preflight(&self, _domain: &str) -> Result<(), AcmeError> {
        // Hooks are resolved when the strategy is built
        Ok(())
    }

    fn publish(
        &self,
        domain: &str,
        _token: &str,
        key_authorization: &str,
    ) -> Result<PublishedProof, AcmeError> {
        let value = dns_txt_value(key_authorization);
        self.hook.add(domain, &value)?;

        if let Err(e) = self.await_propagation(domain, &value) {
            if let Err(cleanup) = self.hook.delete(domain, &value) {
                warn!(domain = %domain, error = %cleanup, "DNS delete hook failed");
            }
            return Err(e);
        }

        Ok(PublishedProof::TxtRecord {
            domain: domain.to_string(),
            value,
        })
    }

    fn retract(&self, proof: &PublishedProof) -> Result<(), AcmeError> {
        if let PublishedProof::TxtRecord { domain, value } = proof {
            self.hook.delete(domain, value)?;
            debug!(domain = %domain, "Retracted TXT record");
        }
        Ok(())
    }
}
