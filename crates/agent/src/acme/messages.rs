//! Typed payloads and resources of the v1 protocol

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

// ============================================================================
// Requests
// ============================================================================

/// `new-reg` payload
#[derive(Debug, Clone, Serialize)]
pub struct NewRegistration {
    pub resource: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<String>,
    pub agreement: String,
}

impl NewRegistration {
    pub fn new(email: Option<&str>, agreement: &str) -> Self {
        Self {
            resource: "new-reg",
            contact: email
                .map(|email| vec![format!("mailto:{}", email)])
                .unwrap_or_default(),
            agreement: agreement.to_string(),
        }
    }
}

/// `new-authz` payload
#[derive(Debug, Clone, Serialize)]
pub struct NewAuthorization {
    pub resource: &'static str,
    pub identifier: Identifier,
}

impl NewAuthorization {
    pub fn new(domain: &str) -> Self {
        Self {
            resource: "new-authz",
            identifier: Identifier::dns(domain),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Identifier {
    pub fn dns(domain: &str) -> Self {
        Self {
            kind: "dns".to_string(),
            value: domain.to_string(),
        }
    }
}

/// Challenge acceptance payload
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeResponse {
    pub resource: &'static str,
    #[serde(rename = "keyAuthorization")]
    pub key_authorization: String,
}

impl ChallengeResponse {
    pub fn new(key_authorization: &str) -> Self {
        Self {
            resource: "challenge",
            key_authorization: key_authorization.to_string(),
        }
    }
}

/// `new-cert` payload; `csr` is the base64url DER request
#[derive(Debug, Clone, Serialize)]
pub struct NewCertificate {
    pub resource: &'static str,
    pub csr: String,
}

impl NewCertificate {
    pub fn new(csr_der: &[u8]) -> Self {
        Self {
            resource: "new-cert",
            csr: URL_SAFE_NO_PAD.encode(csr_der),
        }
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Authorization or challenge status
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Status {
    Pending,
    Valid,
    Invalid,
    /// Anything else the CA may send (`processing`, `revoked`, ...)
    Other(String),
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => Status::Pending,
            "valid" => Status::Valid,
            "invalid" => Status::Invalid,
            _ => Status::Other(value),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Pending => f.write_str("pending"),
            Status::Valid => f.write_str("valid"),
            Status::Invalid => f.write_str("invalid"),
            Status::Other(other) => f.write_str(other),
        }
    }
}

fn pending() -> Status {
    Status::Pending
}

/// Authorization returned by `new-authz`
#[derive(Debug, Clone, Deserialize)]
pub struct Authorization {
    #[serde(default)]
    pub identifier: Option<Identifier>,
    #[serde(default = "pending")]
    pub status: Status,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
}

impl Authorization {
    /// First challenge of the given wire type
    pub fn challenge(&self, kind: &str) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.kind == kind)
    }
}

/// One proof-of-control task
#[derive(Debug, Clone, Deserialize)]
pub struct Challenge {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "pending")]
    pub status: Status,
    pub uri: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub error: Option<Problem>,
}

/// Problem document attached to failed requests and challenges
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Problem {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
}

impl Problem {
    /// Decode a problem from a response body: JSON, or JSON inside base64
    pub fn from_body(body: &[u8]) -> Option<Self> {
        if let Ok(problem) = serde_json::from_slice::<Problem>(body) {
            return Some(problem);
        }

        let text = std::str::from_utf8(body).ok()?.trim();
        let decoded = STANDARD
            .decode(text)
            .or_else(|_| URL_SAFE_NO_PAD.decode(text.trim_end_matches('=')))
            .ok()?;
        serde_json::from_slice(&decoded).ok()
    }
}

/// The CA's `detail` for a failed request, else the raw body
pub fn error_detail(body: &[u8]) -> String {
    match Problem::from_body(body).and_then(|p| p.detail) {
        Some(detail) => detail,
        None => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                "(empty response body)".to_string()
            } else {
                text
            }
        }
    }
}
