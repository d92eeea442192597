//! KDL configuration parsing.
//!
//! The document has one `acme` block and any number of `domain "<name>"`
//! blocks. Unknown top-level nodes are rejected so typos surface early.

use anyhow::Result;
use tracing::trace;

use crate::Config;

mod acme;
mod domain;
mod helpers;

pub use acme::parse_acme_settings;
pub use domain::parse_domain;

/// Parse a complete configuration document
pub fn parse_document(content: &str, source_name: &str) -> Result<Config> {
    let doc: ::kdl::KdlDocument = content.parse().map_err(|e: ::kdl::KdlError| {
        let report = miette::Report::new(e).with_source_code(miette::NamedSource::new(
            source_name,
            content.to_string(),
        ));
        anyhow::anyhow!("Failed to parse {}:\n{:?}", source_name, report)
    })?;

    let mut config = Config::default();
    let mut seen_acme = false;

    for node in doc.nodes() {
        match node.name().value() {
            "acme" => {
                if seen_acme {
                    return Err(anyhow::anyhow!(
                        "Duplicate 'acme' block; only one is allowed"
                    ));
                }
                seen_acme = true;
                config.acme = parse_acme_settings(node)?;
            }
            "domain" => {
                config.domains.push(parse_domain(node)?);
            }
            other => {
                return Err(anyhow::anyhow!(
                    "Unknown top-level node '{}'. Valid nodes: acme, domain",
                    other
                ));
            }
        }
    }

    trace!(
        has_acme_block = seen_acme,
        domain_count = config.domains.len(),
        "Finished parsing document"
    );
    Ok(config)
}
