//! HTTP exchanges with the CA
//!
//! [`HttpTransport`] is the raw seam (HEAD/GET/POST returning status, headers
//! and body). [`AcmeTransport`] layers the protocol rules on top: a fresh
//! replay nonce harvested from the directory before every signed POST, and
//! header extraction for `Location` and `Link: rel="up"`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, trace};

use super::error::AcmeError;
use super::jws::RequestSigner;

/// Header carrying the single-use nonce
pub const REPLAY_NONCE: &str = "replay-nonce";

const USER_AGENT: &str = concat!("certsmith/", env!("CARGO_PKG_VERSION"));

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Responses
// ============================================================================

/// Status, headers and body of one exchange.
///
/// Header names are stored lowercased and values have carriage returns
/// stripped, so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header, normalizing name and value
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.push_header(name, value);
        self
    }

    pub fn push_header(&mut self, name: &str, value: &str) {
        let value: String = value.chars().filter(|c| *c != '\r').collect();
        self.headers
            .push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    /// First value of a header
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header, in arrival order
    pub fn headers_named<'a, 'b>(
        &'a self,
        name: &'b str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'b> {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// URI of a newly created resource
    pub fn location(&self) -> Option<&str> {
        self.header("location").filter(|v| !v.is_empty())
    }

    pub fn replay_nonce(&self) -> Option<&str> {
        self.header(REPLAY_NONCE).filter(|v| !v.is_empty())
    }

    /// Target of the `Link` entry with `rel="up"` (the issuer certificate)
    pub fn link_up(&self) -> Option<String> {
        self.headers_named("link")
            .flat_map(|value| value.split(','))
            .find_map(parse_up_link)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// `<https://ca/acme/issuer-cert>;rel="up"` -> the URI
fn parse_up_link(entry: &str) -> Option<String> {
    let entry = entry.trim();
    let start = entry.find('<')?;
    let end = entry[start..].find('>')? + start;
    let uri = &entry[start + 1..end];

    let is_up = entry[end + 1..].split(';').any(|param| {
        let param = param.trim();
        param
            .strip_prefix("rel=")
            .map(|rel| rel.trim_matches('"').eq_ignore_ascii_case("up"))
            .unwrap_or(false)
    });

    (is_up && !uri.is_empty()).then(|| uri.to_string())
}

// ============================================================================
// Raw Transport
// ============================================================================

/// Plain HTTP client used for the CA and the HTTP-01 self-check
pub trait HttpTransport: Send + Sync {
    fn head(&self, url: &str) -> Result<HttpResponse, AcmeError>;
    fn get(&self, url: &str) -> Result<HttpResponse, AcmeError>;
    fn post(&self, url: &str, body: &[u8]) -> Result<HttpResponse, AcmeError>;
}

/// Blocking `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, AcmeError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    fn convert(response: reqwest::blocking::Response) -> Result<HttpResponse, AcmeError> {
        let mut converted = HttpResponse::new(response.status().as_u16(), Vec::new());
        for (name, value) in response.headers() {
            converted.push_header(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
        }
        converted.body = response.bytes()?.to_vec();

        trace!(
            status = converted.status,
            headers = ?converted.headers,
            body_len = converted.body.len(),
            "HTTP response"
        );
        Ok(converted)
    }
}

impl HttpTransport for ReqwestTransport {
    fn head(&self, url: &str) -> Result<HttpResponse, AcmeError> {
        trace!(url = %url, "HEAD");
        Self::convert(self.client.head(url).send()?)
    }

    fn get(&self, url: &str) -> Result<HttpResponse, AcmeError> {
        trace!(url = %url, "GET");
        Self::convert(self.client.get(url).send()?)
    }

    fn post(&self, url: &str, body: &[u8]) -> Result<HttpResponse, AcmeError> {
        trace!(url = %url, body_len = body.len(), "POST");
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()?;
        Self::convert(response)
    }
}

// ============================================================================
// Protocol Transport
// ============================================================================

/// Signed POSTs and unsigned GETs against one CA
#[derive(Clone)]
pub struct AcmeTransport {
    http: Arc<dyn HttpTransport>,
    signer: RequestSigner,
    directory_url: String,
}

impl AcmeTransport {
    /// `ca` is the CA base URL; the nonce is taken from `<ca>/directory`
    pub fn new(http: Arc<dyn HttpTransport>, signer: RequestSigner, ca: &str) -> Self {
        Self {
            http,
            signer,
            directory_url: format!("{}/directory", ca.trim_end_matches('/')),
        }
    }

    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }

    pub fn http(&self) -> &Arc<dyn HttpTransport> {
        &self.http
    }

    /// HEAD the directory for a nonce that has never been used
    pub fn fresh_nonce(&self) -> Result<String, AcmeError> {
        let response = self.http.head(&self.directory_url)?;
        response.replay_nonce().map(str::to_string).ok_or_else(|| {
            AcmeError::Transport(format!(
                "no Replay-Nonce header from {} (status {})",
                self.directory_url, response.status
            ))
        })
    }

    /// Sign `payload` with a fresh nonce and POST it
    pub fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<HttpResponse, AcmeError> {
        let nonce = self.fresh_nonce()?;
        let envelope = self.signer.sign(&nonce, payload)?;
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| AcmeError::Crypto(format!("envelope serialization failed: {}", e)))?;

        let response = self.http.post(url, &body)?;
        debug!(url = %url, status = response.status, "Signed POST");
        Ok(response)
    }

    /// Unsigned GET
    pub fn get(&self, url: &str) -> Result<HttpResponse, AcmeError> {
        let response = self.http.get(url)?;
        debug!(url = %url, status = response.status, "GET");
        Ok(response)
    }
}

impl std::fmt::Debug for AcmeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmeTransport")
            .field("directory_url", &self.directory_url)
            .field("signer", &self.signer)
            .finish()
    }
}
