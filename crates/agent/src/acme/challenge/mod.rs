//! Challenge fulfillment strategies
//!
//! A strategy makes the key authorization observable to the CA and checks it
//! is observable before the CA is asked to look.
//!
//! # Architecture
//!
//! ```text
//! AuthorizationOrchestrator
//!         │ publish(domain, token, keyAuthorization)
//!         ▼
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │ Http01Challenge      │      │ Dns01Challenge       │
//! │  token file ─► sink  │      │  add hook            │
//! │  self-check via GET  │      │  TXT at the NS (×N)  │
//! └──────────────────────┘      └──────────────────────┘
//!         │ retract(proof)               │
//!         ▼                              ▼
//!   sink.remove(file)              delete hook
//! ```
//!
//! Exactly one strategy is used for all names of a run.

mod dns01;
mod http01;

pub use dns01::{dns_txt_value, Dns01Challenge, ACME_CHALLENGE_LABEL};
pub use http01::Http01Challenge;

use certsmith_common::{ChallengeType, Destination};

use super::error::AcmeError;

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// `token.thumbprint`, the value proven to the CA
pub fn key_authorization(token: &str, thumbprint: &str) -> String {
    format!("{}.{}", token, thumbprint)
}

/// URL the CA (and the self-check) fetches for an HTTP-01 token
pub fn well_known_url(domain: &str, token: &str) -> String {
    format!("http://{}{}{}", domain, ACME_CHALLENGE_PREFIX, token)
}

/// A token is non-empty base64url; anything else never reaches a path
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Extract the token from a request path under the challenge prefix
pub fn extract_token(path: &str) -> Option<&str> {
    path.strip_prefix(ACME_CHALLENGE_PREFIX)
        .filter(|token| is_valid_token(token))
}

/// Something published for one domain, to be retracted afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishedProof {
    /// Token file on the domain's ACL destination
    File(Destination),
    /// TXT value added through the DNS hook
    TxtRecord { domain: String, value: String },
}

/// One of the two proof mechanisms
pub trait ChallengeFulfillment {
    /// Challenge type selected from the CA's offer
    fn challenge_type(&self) -> ChallengeType;

    /// Configuration check for `domain`, run before any network call
    fn preflight(&self, domain: &str) -> Result<(), AcmeError>;

    /// Publish the proof and confirm it is visible.
    ///
    /// On failure anything already published has been removed again.
    fn publish(
        &self,
        domain: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<PublishedProof, AcmeError>;

    /// Remove a proof returned by [`publish`](Self::publish)
    fn retract(&self, proof: &PublishedProof) -> Result<(), AcmeError>;
}
