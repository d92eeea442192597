//! CA operations
//!
//! One method per protocol step, each checking the status code its call site
//! expects and surfacing the CA's problem detail verbatim otherwise.

use tracing::{debug, info, trace};
use url::Url;

use super::error::AcmeError;
use super::messages::{
    error_detail, Authorization, Challenge, ChallengeResponse, NewAuthorization, NewCertificate,
    NewRegistration,
};
use super::transport::{AcmeTransport, HttpResponse};

/// Outcome of account registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// 201: a new account was created
    Created,
    /// 409: the key is already registered
    Existing,
    /// Some other 2xx
    Accepted(u16),
}

/// DER certificates returned by `new-cert`
#[derive(Debug, Clone)]
pub struct IssuedDer {
    pub leaf: Vec<u8>,
    pub issuer: Vec<u8>,
}

/// Client for one CA, sharing the account key across all calls
#[derive(Debug, Clone)]
pub struct AcmeClient {
    transport: AcmeTransport,
    ca: Url,
}

impl AcmeClient {
    pub fn new(transport: AcmeTransport, ca: &str) -> Result<Self, AcmeError> {
        let ca = Url::parse(&format!("{}/", ca.trim_end_matches('/')))
            .map_err(|e| AcmeError::Configuration(format!("invalid CA URL '{}': {}", ca, e)))?;
        Ok(Self { transport, ca })
    }

    pub fn transport(&self) -> &AcmeTransport {
        &self.transport
    }

    /// Account thumbprint for key authorizations
    pub fn thumbprint(&self) -> String {
        self.transport.signer().thumbprint()
    }

    /// `<ca>/acme/<resource>`
    fn endpoint(&self, resource: &str) -> String {
        self.resolve(&format!("acme/{}", resource))
    }

    /// Resolve a (possibly relative) URI returned by the CA
    fn resolve(&self, uri: &str) -> String {
        self.ca
            .join(uri)
            .map(String::from)
            .unwrap_or_else(|_| uri.to_string())
    }

    /// Register the account key, accepting an existing registration
    pub fn register(&self, email: Option<&str>, agreement: &str) -> Result<Registration, AcmeError> {
        let response = self
            .transport
            .post(&self.endpoint("new-reg"), &NewRegistration::new(email, agreement))?;

        let registration = match response.status {
            201 => Registration::Created,
            409 => Registration::Existing,
            status if response.is_success() => Registration::Accepted(status),
            _ => return Err(protocol_error("new-reg", &response)),
        };

        info!(result = ?registration, "Account registration");
        Ok(registration)
    }

    /// Create an authorization for `domain`
    pub fn new_authorization(&self, domain: &str) -> Result<Authorization, AcmeError> {
        let response = self
            .transport
            .post(&self.endpoint("new-authz"), &NewAuthorization::new(domain))?;

        if response.status != 201 {
            return Err(protocol_error("new-authz", &response));
        }

        trace!(domain = %domain, body = %response.body_text(), "Authorization");
        let mut authz: Authorization = parse_json("new-authz", &response)?;
        for challenge in &mut authz.challenges {
            challenge.uri = self.resolve(&challenge.uri);
        }

        debug!(
            domain = %domain,
            status = %authz.status,
            challenges = authz.challenges.len(),
            "Created authorization"
        );
        Ok(authz)
    }

    /// Tell the CA the proof is in place
    pub fn accept_challenge(&self, uri: &str, key_authorization: &str) -> Result<(), AcmeError> {
        let response = self
            .transport
            .post(uri, &ChallengeResponse::new(key_authorization))?;

        if response.status != 202 {
            return Err(protocol_error("challenge", &response));
        }

        debug!(uri = %uri, "Challenge accepted");
        Ok(())
    }

    /// Current state of a challenge (unsigned GET)
    pub fn challenge_status(&self, uri: &str) -> Result<Challenge, AcmeError> {
        let response = self.transport.get(uri)?;
        if !response.is_success() {
            return Err(protocol_error("challenge-status", &response));
        }
        trace!(uri = %uri, body = %response.body_text(), "Challenge status");
        parse_json("challenge-status", &response)
    }

    /// Submit the CSR and fetch the leaf and issuer certificates
    pub fn new_certificate(&self, csr_der: &[u8]) -> Result<IssuedDer, AcmeError> {
        let response = self
            .transport
            .post(&self.endpoint("new-cert"), &NewCertificate::new(csr_der))?;

        let Some(location) = response.location().map(|l| self.resolve(l)) else {
            return Err(protocol_error("new-cert", &response));
        };
        let issuer_uri = response.link_up().map(|l| self.resolve(&l)).ok_or_else(|| {
            AcmeError::Transport("new-cert response has no Link rel=\"up\" header".to_string())
        })?;

        debug!(location = %location, issuer = %issuer_uri, "Certificate issued");

        let leaf = self.fetch_der("certificate", &location)?;
        let issuer = self.fetch_der("issuer-certificate", &issuer_uri)?;
        Ok(IssuedDer { leaf, issuer })
    }

    fn fetch_der(&self, step: &'static str, uri: &str) -> Result<Vec<u8>, AcmeError> {
        let response = self.transport.get(uri)?;
        if !response.is_success() || response.body.is_empty() {
            return Err(protocol_error(step, &response));
        }
        Ok(response.body)
    }
}

fn protocol_error(step: &'static str, response: &HttpResponse) -> AcmeError {
    AcmeError::Protocol {
        step,
        status: response.status,
        detail: error_detail(&response.body),
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(
    step: &'static str,
    response: &HttpResponse,
) -> Result<T, AcmeError> {
    serde_json::from_slice(&response.body).map_err(|e| AcmeError::Protocol {
        step,
        status: response.status,
        detail: format!("malformed response: {}", e),
    })
}
