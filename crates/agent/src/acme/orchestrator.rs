//! Per-domain authorization state machine
//!
//! ```text
//! Start ──new-authz──► AuthorizedPending ──publish──► ChallengePublished
//!   │ (already valid)                                       │ accept
//!   ▼                                                       ▼
//! Valid ◄──────────── poll (pending → keep polling) ── ChallengeNotified
//!                                                           │
//!                                                           ▼
//!                                                        Invalid
//! ```
//!
//! Domains are authorized one after another. Whatever the outcome, a
//! published proof is retracted before moving on.

use tracing::{debug, info, warn};

use super::challenge::{is_valid_token, key_authorization, ChallengeFulfillment};
use super::client::AcmeClient;
use super::clock::{PollPolicy, Sleeper};
use super::error::AcmeError;
use super::messages::{Challenge, Status};

/// Where a domain's authorization stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationState {
    Start,
    AuthorizedPending,
    ChallengePublished,
    ChallengeNotified,
    Valid,
    Invalid,
}

/// Drives authorizations for every name of a certificate
pub struct AuthorizationOrchestrator<'a> {
    client: &'a AcmeClient,
    strategy: &'a dyn ChallengeFulfillment,
    sleeper: &'a dyn Sleeper,
    poll: PollPolicy,
}

impl<'a> AuthorizationOrchestrator<'a> {
    pub fn new(
        client: &'a AcmeClient,
        strategy: &'a dyn ChallengeFulfillment,
        sleeper: &'a dyn Sleeper,
        poll: PollPolicy,
    ) -> Self {
        Self {
            client,
            strategy,
            sleeper,
            poll,
        }
    }

    /// Configuration check for every name, before any request is sent
    pub fn preflight(&self, names: &[String]) -> Result<(), AcmeError> {
        names.iter().try_for_each(|name| self.strategy.preflight(name))
    }

    /// Authorize each name in order, stopping at the first failure
    pub fn authorize_all(&self, names: &[String]) -> Result<(), AcmeError> {
        self.preflight(names)?;
        for name in names {
            self.authorize(name)?;
        }
        info!(names = names.len(), "All names authorized");
        Ok(())
    }

    /// Run one name through the state machine
    pub fn authorize(&self, domain: &str) -> Result<AuthorizationState, AcmeError> {
        let mut state = AuthorizationState::Start;
        debug!(domain = %domain, state = ?state, "Authorizing");

        let authz = self.client.new_authorization(domain)?;
        if authz.status == Status::Valid {
            info!(domain = %domain, "Authorization already valid");
            return Ok(AuthorizationState::Valid);
        }
        state = self.transition(domain, state, AuthorizationState::AuthorizedPending);

        let kind = self.strategy.challenge_type();
        let challenge = authz.challenge(kind.as_str()).ok_or_else(|| AcmeError::Protocol {
            step: "new-authz",
            status: 201,
            detail: format!(
                "no {} challenge offered for {} (offered: {})",
                kind,
                domain,
                authz
                    .challenges
                    .iter()
                    .map(|c| c.kind.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })?;
        if !is_valid_token(&challenge.token) {
            return Err(AcmeError::Protocol {
                step: "new-authz",
                status: 201,
                detail: format!("challenge token {:?} for {} is not base64url", challenge.token, domain),
            });
        }

        let key_auth = key_authorization(&challenge.token, &self.client.thumbprint());
        let proof = self.strategy.publish(domain, &challenge.token, &key_auth)?;
        state = self.transition(domain, state, AuthorizationState::ChallengePublished);

        let result = self
            .client
            .accept_challenge(&challenge.uri, &key_auth)
            .and_then(|()| {
                let notified = self.transition(domain, state, AuthorizationState::ChallengeNotified);
                self.poll_until_terminal(domain, challenge, notified)
            });

        if let Err(e) = self.strategy.retract(&proof) {
            warn!(domain = %domain, error = %e, "Failed to retract challenge proof");
        }

        result
    }

    /// GET the challenge until it leaves `pending`
    fn poll_until_terminal(
        &self,
        domain: &str,
        challenge: &Challenge,
        state: AuthorizationState,
    ) -> Result<AuthorizationState, AcmeError> {
        let mut attempt: u32 = 1;
        loop {
            let current = self.client.challenge_status(&challenge.uri)?;
            match current.status {
                Status::Valid => {
                    return Ok(self.transition(domain, state, AuthorizationState::Valid));
                }
                Status::Invalid => {
                    self.transition(domain, state, AuthorizationState::Invalid);
                    let detail = current
                        .error
                        .and_then(|problem| problem.detail)
                        .unwrap_or_else(|| "challenge invalid, no detail given".to_string());
                    return Err(AcmeError::validation(domain, detail));
                }
                Status::Pending => {
                    debug!(domain = %domain, attempt, "Challenge pending");
                }
                Status::Other(other) => {
                    return Err(AcmeError::Protocol {
                        step: "challenge-status",
                        status: 200,
                        detail: format!("unexpected challenge status '{}'", other),
                    });
                }
            }

            if !self.poll.allows_retry_after(attempt) {
                return Err(AcmeError::validation(
                    domain,
                    format!("challenge still pending after {} polls", attempt),
                ));
            }
            self.sleeper.sleep(self.poll.interval);
            attempt = attempt.saturating_add(1);
        }
    }

    fn transition(
        &self,
        domain: &str,
        from: AuthorizationState,
        to: AuthorizationState,
    ) -> AuthorizationState {
        debug!(domain = %domain, from = ?from, to = ?to, "Authorization state");
        to
    }
}
