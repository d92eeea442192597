//! `acme` block parsing.

use anyhow::Result;
use std::path::PathBuf;
use tracing::trace;

use crate::{
    default_agreement, default_ca, default_dns_attempts, default_dns_interval_secs,
    default_key_length, default_poll_interval_secs, default_working_dir, AcmeSettings,
};

use super::helpers::{get_int_entry, get_string_entry};

/// Parse the CA and account settings block
pub fn parse_acme_settings(node: &::kdl::KdlNode) -> Result<AcmeSettings> {
    trace!("Parsing acme configuration block");

    let settings = AcmeSettings {
        ca: get_string_entry(node, "ca")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(default_ca),
        agreement: get_string_entry(node, "agreement").unwrap_or_else(default_agreement),
        email: get_string_entry(node, "email"),
        account_key_length: positive_u32(node, "account-key-length")?
            .unwrap_or_else(default_key_length),
        working_dir: get_string_entry(node, "working-dir")
            .map(PathBuf::from)
            .unwrap_or_else(default_working_dir),
        poll_interval_secs: positive_u32(node, "poll-interval-secs")?
            .map(u64::from)
            .unwrap_or_else(default_poll_interval_secs),
        dns_attempts: positive_u32(node, "dns-attempts")?.unwrap_or_else(default_dns_attempts),
        dns_interval_secs: positive_u32(node, "dns-interval-secs")?
            .map(u64::from)
            .unwrap_or_else(default_dns_interval_secs),
    };

    trace!(
        ca = %settings.ca,
        account_key_length = settings.account_key_length,
        working_dir = %settings.working_dir.display(),
        "Parsed acme configuration"
    );

    Ok(settings)
}

/// Integer setting that must be a positive 32-bit value when present
pub(super) fn positive_u32(node: &::kdl::KdlNode, name: &str) -> Result<Option<u32>> {
    match get_int_entry(node, name) {
        None => Ok(None),
        Some(v) if v > 0 && v <= i64::from(u32::MAX) => Ok(Some(v as u32)),
        Some(v) => Err(anyhow::anyhow!(
            "'{}' must be a positive integer, got {}",
            name,
            v
        )),
    }
}
