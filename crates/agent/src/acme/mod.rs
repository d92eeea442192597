//! ACME certificate issuance
//!
//! Implements the signed-request dialect of the early Let's Encrypt API
//! (`new-reg`, `new-authz`, `challenge`, `new-cert`) as a synchronous
//! engine: every request blocks, every wait goes through an injectable
//! [`Sleeper`].
//!
//! # Architecture
//!
//! - [`KeyStore`] - account key, domain keys and CSRs on disk
//! - [`RequestSigner`] - JWS envelopes with a fresh nonce per request
//! - [`AcmeTransport`] - nonce harvesting, signed POSTs, header extraction
//! - [`AcmeClient`] - one method per protocol step with its expected status
//! - [`AuthorizationOrchestrator`] - authorize, publish, notify, poll
//! - [`ChallengeFulfillment`] - HTTP-01 and DNS-01 strategies
//! - [`CertificateManager`] - renewal gate, issuance, backups, PEM files
//! - [`IssuanceRun`] - all of the above for one domain
//!
//! # Issuance Flow
//!
//! 1. [`CertificateManager`] checks the renewal window and stops if not due
//! 2. Configuration for every name is checked before anything is sent
//! 3. [`KeyStore`] loads or creates the keys and the CSR
//! 4. The account is registered (an existing registration is fine)
//! 5. Each name is authorized in turn, its proof published and retracted
//! 6. The CSR is submitted; leaf and intermediate are fetched and written
//! 7. Artifacts are deployed and the reload command runs

pub mod certificate;
pub mod challenge;
pub mod client;
pub mod clock;
pub mod error;
pub mod hooks;
pub mod jws;
pub mod keystore;
pub mod messages;
pub mod orchestrator;
pub mod resolver;
pub mod runner;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use certificate::{CertificateManager, IssuedCertificate, RenewalDecision};
pub use challenge::{ChallengeFulfillment, Dns01Challenge, Http01Challenge, PublishedProof};
pub use client::{AcmeClient, Registration};
pub use clock::{Clock, PollPolicy, Sleeper, SystemClock, ThreadSleeper};
pub use error::AcmeError;
pub use hooks::{CommandHook, DnsHook};
pub use jws::{AccountKey, Jwk, RequestSigner, SignedRequest, Signer};
pub use keystore::KeyStore;
pub use orchestrator::{AuthorizationOrchestrator, AuthorizationState};
pub use resolver::{DnsResolver, HickoryDnsResolver};
pub use runner::{run_domains, IssuanceRun, RunOutcome};
pub use transport::{AcmeTransport, HttpResponse, HttpTransport, ReqwestTransport};
