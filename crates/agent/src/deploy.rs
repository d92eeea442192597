//! Shipping finished artifacts
//!
//! Copies the certificate, key, chain and full chain to their configured
//! destinations, then runs the reload command so services pick them up.

use certsmith_config::DeployConfig;
use tracing::info;

use crate::acme::AcmeError;
use crate::context::DomainPaths;
use crate::sink::ArtifactSink;

/// Copies artifacts through the shared sink
#[derive(Debug, Clone)]
pub struct Deployer {
    sink: ArtifactSink,
}

impl Deployer {
    pub fn new(sink: ArtifactSink) -> Self {
        Self { sink }
    }

    /// Copy every configured artifact, then reload; returns the copy count
    pub fn deploy(&self, config: &DeployConfig, paths: &DomainPaths) -> Result<usize, AcmeError> {
        let artifacts = [
            (&config.cert, &paths.certificate),
            (&config.key, &paths.key),
            (&config.chain, &paths.chain),
            (&config.fullchain, &paths.full_chain),
        ];

        let mut copied = 0;
        for (destination, source) in artifacts {
            if let Some(destination) = destination {
                self.sink.put(source, destination)?;
                info!(source = %source.display(), destination = %destination, "Deployed");
                copied += 1;
            }
        }

        if let Some(reload) = &config.reload {
            self.sink.run(reload)?;
        }

        Ok(copied)
    }
}
