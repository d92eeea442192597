//! Shared types for the certsmith ACME agent.
//!
//! Kept free of I/O so both the configuration crate and the agent can use
//! the same vocabulary for challenge modes and artifact locations.

pub mod ids;
pub mod types;

pub use ids::RunId;
pub use types::{ChallengeType, Destination, DestinationParseError, ReloadCommand};
