//! HTTP-01: a token file on the domain's web root

use std::fs;
use std::path::Path;

use certsmith_common::ChallengeType;
use certsmith_config::DomainConfig;
use tracing::{debug, info, warn};

use super::{is_valid_token, well_known_url, ChallengeFulfillment, PublishedProof};
use crate::acme::error::AcmeError;
use crate::acme::transport::HttpTransport;
use crate::sink::ArtifactSink;

/// Writes `keyAuthorization` to `<scratch>/<token>`, copies it to the
/// domain's ACL destination and fetches it back over plain HTTP.
pub struct Http01Challenge<'a> {
    domain: &'a DomainConfig,
    scratch: &'a Path,
    sink: &'a ArtifactSink,
    http: &'a dyn HttpTransport,
}

impl<'a> Http01Challenge<'a> {
    pub fn new(
        domain: &'a DomainConfig,
        scratch: &'a Path,
        sink: &'a ArtifactSink,
        http: &'a dyn HttpTransport,
    ) -> Self {
        Self {
            domain,
            scratch,
            sink,
            http,
        }
    }

    /// GET the well-known URL and compare the body byte for byte
    fn self_check(&self, name: &str, token: &str, key_authorization: &str) -> Result<(), AcmeError> {
        let url = well_known_url(name, token);
        let response = self
            .http
            .get(&url)
            .map_err(|e| AcmeError::validation(name, format!("self-check GET {} failed: {}", url, e)))?;

        if response.status != 200 || response.body != key_authorization.as_bytes() {
            return Err(AcmeError::validation(
                name,
                format!(
                    "{} returned status {} with {:?}, expected {:?}",
                    url,
                    response.status,
                    response.body_text(),
                    key_authorization
                ),
            ));
        }

        debug!(domain = %name, url = %url, "HTTP-01 self-check passed");
        Ok(())
    }
}

impl ChallengeFulfillment for Http01Challenge<'_> {
    fn challenge_type(&self) -> ChallengeType {
        ChallengeType::Http01
    }

    fn preflight(&self, name: &str) -> Result<(), AcmeError> {
        self.domain.acl_for(name).map(|_| ()).ok_or_else(|| {
            AcmeError::Configuration(format!("no ACL entry for {} (http-01)", name))
        })
    }

    fn publish(
        &self,
        name: &str,
        token: &str,
        key_authorization: &str,
    ) -> Result<PublishedProof, AcmeError> {
        if !is_valid_token(token) {
            return Err(AcmeError::Protocol {
                step: "new-authz",
                status: 201,
                detail: format!("challenge token {:?} for {} is not base64url", token, name),
            });
        }

        let acl = self.domain.acl_for(name).ok_or_else(|| {
            AcmeError::Configuration(format!("no ACL entry for {} (http-01)", name))
        })?;

        let local = self.scratch.join(token);
        fs::write(&local, key_authorization)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&local, fs::Permissions::from_mode(0o644))?;
        }

        let destination = acl.join(token);
        self.sink.put(&local, &destination)?;
        info!(domain = %name, token = %token, destination = %destination, "Published HTTP-01 token");

        let proof = PublishedProof::File(destination);
        if let Err(e) = self.self_check(name, token, key_authorization) {
            if let Err(cleanup) = self.retract(&proof) {
                warn!(domain = %name, error = %cleanup, "Failed to remove challenge token");
            }
            return Err(e);
        }

        Ok(proof)
    }

    fn retract(&self, proof: &PublishedProof) -> Result<(), AcmeError> {
        if let PublishedProof::File(destination) = proof {
            self.sink.remove(destination)?;
            if let Some(token) = destination.path().file_name() {
                let _ = fs::remove_file(self.scratch.join(token));
            }
            debug!(destination = %destination, "Retracted HTTP-01 token");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::testing::{FakeHttp, Method, RecordingTransfer, RemoteOp};
    use crate::acme::transport::HttpResponse;
    use certsmith_common::Destination;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        temp_dir: TempDir,
        scratch: std::path::PathBuf,
        domain: DomainConfig,
        sink: ArtifactSink,
        remote: Arc<RecordingTransfer>,
        http: FakeHttp,
    }

    fn setup_fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let scratch = temp_dir.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();

        let mut domain = DomainConfig::new("example.com");
        domain.aliases = vec!["www.example.com".to_string()];
        domain.acl.insert(
            "example.com".to_string(),
            Destination::Local(temp_dir.path().join("webroot")),
        );
        domain.acl.insert(
            "www.example.com".to_string(),
            Destination::parse("ssh:web1:/var/www/acme").unwrap(),
        );

        let remote = Arc::new(RecordingTransfer::default());
        Fixture {
            sink: ArtifactSink::new(remote.clone()),
            remote,
            http: FakeHttp::new(),
            domain,
            scratch,
            temp_dir,
        }
    }

    impl Fixture {
        fn challenge(&self) -> Http01Challenge<'_> {
            Http01Challenge::new(&self.domain, &self.scratch, &self.sink, &self.http)
        }
    }

    #[test]
    fn test_preflight_requires_acl() {
        let fixture = setup_fixture();
        let challenge = fixture.challenge();
        challenge.preflight("example.com").unwrap();
        challenge.preflight("WWW.example.com").unwrap();

        let err = challenge.preflight("api.example.com").unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn test_publish_local_and_self_check() {
        let fixture = setup_fixture();
        fixture.http.on(
            Method::Get,
            "http://example.com/.well-known/acme-challenge/tok1",
            HttpResponse::new(200, "tok1.thumb"),
        );

        let challenge = fixture.challenge();
        let proof = challenge.publish("example.com", "tok1", "tok1.thumb").unwrap();

        let published = fixture.temp_dir.path().join("webroot/tok1");
        assert_eq!(fs::read_to_string(&published).unwrap(), "tok1.thumb");
        assert_eq!(proof, PublishedProof::File(Destination::Local(published.clone())));

        challenge.retract(&proof).unwrap();
        assert!(!published.exists());
    }

    #[test]
    fn test_self_check_mismatch_fails_and_cleans_up() {
        let fixture = setup_fixture();
        fixture.http.on(
            Method::Get,
            "http://example.com/.well-known/acme-challenge/tok1",
            HttpResponse::new(200, "tok1.other"),
        );

        let err = fixture
            .challenge()
            .publish("example.com", "tok1", "tok1.thumb")
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(!fixture.temp_dir.path().join("webroot/tok1").exists());
    }

    #[test]
    fn test_self_check_unreachable() {
        let fixture = setup_fixture();
        let err = fixture
            .challenge()
            .publish("example.com", "tok1", "tok1.thumb")
            .unwrap_err();
        assert!(err.to_string().contains("status 404"));
    }

    #[test]
    fn test_publish_rejects_path_tokens() {
        let fixture = setup_fixture();
        let outside = fixture.temp_dir.path().join("x");
        fs::write(&outside, "keep").unwrap();
        let challenge = fixture.challenge();

        let traversal = challenge.publish("example.com", "../x", "evil").unwrap_err();
        assert_eq!(traversal.kind(), "protocol");

        let absolute = outside.to_string_lossy().into_owned();
        let err = challenge.publish("example.com", &absolute, "evil").unwrap_err();
        assert_eq!(err.kind(), "protocol");
        let err = challenge.publish("www.example.com", "/abs/x", "evil").unwrap_err();
        assert_eq!(err.kind(), "protocol");

        assert_eq!(fs::read_to_string(&outside).unwrap(), "keep");
        assert_eq!(fs::read_dir(&fixture.scratch).unwrap().count(), 0);
        assert!(!fixture.temp_dir.path().join("webroot").exists());
        assert!(fixture.remote.ops().is_empty());
        assert!(fixture.http.log().is_empty());
    }

    #[test]
    fn test_publish_remote() {
        let fixture = setup_fixture();
        fixture.http.on(
            Method::Get,
            "http://www.example.com/.well-known/acme-challenge/tok2",
            HttpResponse::new(200, "tok2.thumb"),
        );

        let challenge = fixture.challenge();
        let proof = challenge.publish("www.example.com", "tok2", "tok2.thumb").unwrap();
        challenge.retract(&proof).unwrap();

        assert_eq!(
            fixture.remote.ops(),
            vec![
                RemoteOp::Copy {
                    host: "web1".to_string(),
                    remote: "/var/www/acme/tok2".into(),
                    contents: b"tok2.thumb".to_vec(),
                },
                RemoteOp::Remove {
                    host: "web1".to_string(),
                    remote: "/var/www/acme/tok2".into(),
                },
            ]
        );
    }
}
