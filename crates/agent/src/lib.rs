//! Certsmith
//!
//! Unattended ACME certificate issuance, renewal and deployment.
//!
//! For each configured domain a run decides whether the certificate is due,
//! proves control of every name to the CA (HTTP-01 token files or DNS-01
//! TXT records), collects the certificate and its intermediate, and copies
//! the results to where services read them.
//!
//! # Example
//!
//! ```ignore
//! use certsmith::{run_domains, Capabilities, CleanupRegistry};
//! use certsmith_config::Config;
//!
//! let config = Config::from_file("certsmith.kdl")?;
//! let caps = Capabilities::system()?;
//! let cleanup = CleanupRegistry::new();
//! cleanup.install()?;
//!
//! for (domain, outcome) in run_domains(&config, &["example.com".into()], false, &caps, &cleanup)? {
//!     println!("{domain}: {outcome:?}");
//! }
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod context;
pub mod deploy;
pub mod signals;
pub mod sink;

// ============================================================================
// Public API Re-exports
// ============================================================================

pub use acme::{run_domains, AcmeError, IssuanceRun, RunOutcome};
pub use context::{Capabilities, DomainPaths, RunContext};
pub use deploy::Deployer;
pub use signals::{CleanupRegistry, INTERRUPTED_EXIT_CODE};
pub use sink::{ArtifactSink, RemoteTransfer, SshTransfer};
