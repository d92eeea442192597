//! `domain` block parsing.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tracing::trace;

use certsmith_common::{ChallengeType, Destination, ReloadCommand};

use crate::{default_key_length, default_renew_allow_days, DeployConfig, DnsHooks, DomainConfig};

use super::acme::positive_u32;
use super::helpers::{get_arg_strings, get_child, get_first_arg_string, get_string_entry, get_string_list};

/// Parse one `domain "<name>" { ... }` block
pub fn parse_domain(node: &::kdl::KdlNode) -> Result<DomainConfig> {
    let name = get_first_arg_string(node).ok_or_else(|| {
        anyhow::anyhow!("Domain requires a name argument, e.g., domain \"example.com\" {{ ... }}")
    })?;
    let name = name.trim().to_ascii_lowercase();

    trace!(domain = %name, "Parsing domain");

    let challenge = match get_string_entry(node, "challenge") {
        Some(value) => ChallengeType::from_str_loose(&value).ok_or_else(|| {
            anyhow::anyhow!(
                "Invalid challenge '{}' for domain '{}'. Valid challenges: http-01, dns-01",
                value,
                name
            )
        })?,
        None => ChallengeType::default(),
    };

    let domain = DomainConfig {
        aliases: get_string_list(node, "aliases")
            .into_iter()
            .map(|a| a.trim().to_ascii_lowercase())
            .collect(),
        key_length: positive_u32(node, "key-length")?.unwrap_or_else(default_key_length),
        renew_allow_days: positive_u32(node, "renew-allow-days")?
            .unwrap_or_else(default_renew_allow_days),
        challenge,
        acl: parse_acl(node, &name)?,
        dns_hooks: parse_dns_hooks(node),
        deploy: parse_deploy(node, &name)?,
        name,
    };

    trace!(
        domain = %domain.name,
        aliases = domain.aliases.len(),
        challenge = %domain.challenge,
        acl_entries = domain.acl.len(),
        "Parsed domain"
    );

    Ok(domain)
}

/// `acl { "<san>" "<destination>" ... }`
fn parse_acl(node: &::kdl::KdlNode, domain: &str) -> Result<BTreeMap<String, Destination>> {
    let mut acl = BTreeMap::new();

    let Some(children) = get_child(node, "acl").and_then(|n| n.children()) else {
        return Ok(acl);
    };

    for entry in children.nodes() {
        let san = entry.name().value().trim().to_ascii_lowercase();
        let location = get_first_arg_string(entry).ok_or_else(|| {
            anyhow::anyhow!(
                "ACL entry '{}' for domain '{}' requires a location, e.g., \"{}\" \"/var/www/.well-known/acme-challenge\"",
                san,
                domain,
                san
            )
        })?;
        let destination = Destination::parse(&location)
            .with_context(|| format!("Invalid ACL location for '{}' in domain '{}'", san, domain))?;

        if acl.insert(san.clone(), destination).is_some() {
            return Err(anyhow::anyhow!(
                "Duplicate ACL entry '{}' in domain '{}'",
                san,
                domain
            ));
        }
    }

    Ok(acl)
}

/// `dns-hooks { add "..."; delete "..." }`
fn parse_dns_hooks(node: &::kdl::KdlNode) -> DnsHooks {
    match get_child(node, "dns-hooks") {
        Some(hooks) => DnsHooks {
            add: get_string_entry(hooks, "add"),
            delete: get_string_entry(hooks, "delete"),
        },
        None => DnsHooks::default(),
    }
}

/// `deploy { cert "..."; key "..."; chain "..."; fullchain "..."; reload "..." }`
fn parse_deploy(node: &::kdl::KdlNode, domain: &str) -> Result<DeployConfig> {
    let Some(deploy) = get_child(node, "deploy") else {
        return Ok(DeployConfig::default());
    };

    let destination = |key: &str| -> Result<Option<Destination>> {
        get_string_entry(deploy, key)
            .map(|s| {
                Destination::parse(&s).with_context(|| {
                    format!("Invalid deploy '{}' location in domain '{}'", key, domain)
                })
            })
            .transpose()
    };

    let reload = get_child(deploy, "reload")
        .map(|n| get_arg_strings(n).join(" "))
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            ReloadCommand::parse(&s)
                .with_context(|| format!("Invalid reload command in domain '{}'", domain))
        })
        .transpose()?;

    Ok(DeployConfig {
        cert: destination("cert")?,
        key: destination("key")?,
        chain: destination("chain")?,
        fullchain: destination("fullchain")?,
        reload,
    })
}
