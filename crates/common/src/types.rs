//! Challenge modes and artifact locations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prefix marking a location on a remote host reached over ssh
pub const REMOTE_PREFIX: &str = "ssh:";

// ============================================================================
// Challenge Type
// ============================================================================

/// Domain validation method used for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChallengeType {
    /// Publish a token file under `/.well-known/acme-challenge/`
    #[default]
    #[serde(rename = "http-01")]
    Http01,
    /// Publish a TXT record under `_acme-challenge.<domain>`
    #[serde(rename = "dns-01")]
    Dns01,
}

impl ChallengeType {
    /// Wire name used by the CA
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::Http01 => "http-01",
            ChallengeType::Dns01 => "dns-01",
        }
    }

    /// Parse from a configuration value, accepting a few spellings
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http-01" | "http01" | "http" => Some(ChallengeType::Http01),
            "dns-01" | "dns01" | "dns" => Some(ChallengeType::Dns01),
            _ => None,
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Destination
// ============================================================================

/// Error parsing a destination or reload command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DestinationParseError {
    #[error("empty location")]
    Empty,

    #[error("remote location '{0}' is missing a host (expected ssh:host:/path)")]
    MissingHost(String),

    #[error("remote location '{0}' is missing a path (expected ssh:host:/path)")]
    MissingPath(String),
}

/// Where an artifact is published: challenge files and deployed certificates
/// both go through this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    /// A path on the local filesystem
    Local(PathBuf),
    /// A path on a remote host reached over ssh
    Remote { host: String, path: PathBuf },
}

impl Destination {
    /// Parse `ssh:host:/path` as remote, anything else as a local path.
    pub fn parse(s: &str) -> Result<Self, DestinationParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DestinationParseError::Empty);
        }

        let Some(rest) = s.strip_prefix(REMOTE_PREFIX) else {
            return Ok(Destination::Local(PathBuf::from(s)));
        };

        let (host, path) = rest
            .split_once(':')
            .ok_or_else(|| DestinationParseError::MissingPath(s.to_string()))?;
        if host.is_empty() {
            return Err(DestinationParseError::MissingHost(s.to_string()));
        }
        if path.is_empty() {
            return Err(DestinationParseError::MissingPath(s.to_string()));
        }

        Ok(Destination::Remote {
            host: host.to_string(),
            path: PathBuf::from(path),
        })
    }

    /// The path component, local or remote
    pub fn path(&self) -> &Path {
        match self {
            Destination::Local(path) => path,
            Destination::Remote { path, .. } => path,
        }
    }

    /// Destination for a file inside this (directory) destination
    pub fn join(&self, name: &str) -> Self {
        match self {
            Destination::Local(path) => Destination::Local(path.join(name)),
            Destination::Remote { host, path } => Destination::Remote {
                host: host.clone(),
                path: path.join(name),
            },
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Destination::Remote { .. })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Local(path) => write!(f, "{}", path.display()),
            Destination::Remote { host, path } => {
                write!(f, "{}{}:{}", REMOTE_PREFIX, host, path.display())
            }
        }
    }
}

// ============================================================================
// Reload Command
// ============================================================================

/// Command run after deployment so services pick up the new certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReloadCommand {
    /// Run through the local shell
    Local(String),
    /// Run on a remote host over ssh
    Remote { host: String, command: String },
}

impl ReloadCommand {
    /// Parse `ssh:host:command` as remote, anything else as a local command.
    pub fn parse(s: &str) -> Result<Self, DestinationParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DestinationParseError::Empty);
        }

        let Some(rest) = s.strip_prefix(REMOTE_PREFIX) else {
            return Ok(ReloadCommand::Local(s.to_string()));
        };

        let (host, command) = rest
            .split_once(':')
            .ok_or_else(|| DestinationParseError::MissingPath(s.to_string()))?;
        if host.is_empty() {
            return Err(DestinationParseError::MissingHost(s.to_string()));
        }
        if command.trim().is_empty() {
            return Err(DestinationParseError::MissingPath(s.to_string()));
        }

        Ok(ReloadCommand::Remote {
            host: host.to_string(),
            command: command.trim().to_string(),
        })
    }
}

impl fmt::Display for ReloadCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadCommand::Local(command) => f.write_str(command),
            ReloadCommand::Remote { host, command } => {
                write!(f, "{}{}:{}", REMOTE_PREFIX, host, command)
            }
        }
    }
}
