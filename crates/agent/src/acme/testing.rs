//! Deterministic doubles for the capability traits

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

use super::clock::{Clock, Sleeper};
use super::error::AcmeError;
use super::hooks::DnsHook;
use super::jws::{AccountKey, RequestSigner};
use super::resolver::DnsResolver;
use super::transport::{HttpResponse, HttpTransport};
use crate::sink::RemoteTransfer;

pub const TEST_KEY_BITS: u32 = 2048;

fn test_private_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), TEST_KEY_BITS as usize).unwrap())
}

/// Shared account key, generated once per test binary
pub fn test_account_key() -> &'static AccountKey {
    static ACCOUNT: OnceLock<AccountKey> = OnceLock::new();
    ACCOUNT.get_or_init(|| AccountKey::new(test_private_key().clone()))
}

/// PKCS#8 PEM of the shared test key
pub fn test_domain_key_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    PEM.get_or_init(|| {
        test_private_key()
            .to_pkcs8_pem(LineEnding::LF)
            .unwrap()
            .to_string()
    })
}

pub fn test_signer() -> RequestSigner {
    RequestSigner::new(Arc::new(test_account_key().clone()))
}

// ============================================================================
// HTTP
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Head,
    Get,
    Post,
}

/// Scripted HTTP responses keyed by method and URL.
///
/// A HEAD to any `/directory` URL without a script answers with a new nonce.
/// Unscripted requests get a 404.
#[derive(Default)]
pub struct FakeHttp {
    scripts: Mutex<HashMap<(Method, String), VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<(Method, String, Vec<u8>)>>,
    nonces: AtomicU32,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every matching request with `response`
    pub fn on(&self, method: Method, url: &str, response: HttpResponse) {
        self.on_sequence(method, url, vec![response]);
    }

    /// Answer with each response in turn; the last one repeats
    pub fn on_sequence(&self, method: Method, url: &str, responses: Vec<HttpResponse>) {
        self.scripts
            .lock()
            .insert((method, url.to_string()), responses.into());
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(m, u, _)| *m == method && u == url)
            .count()
    }

    /// Bodies POSTed to `url`, oldest first
    pub fn posted_to(&self, url: &str) -> Vec<Vec<u8>> {
        self.requests
            .lock()
            .iter()
            .filter(|(m, u, _)| *m == Method::Post && u == url)
            .map(|(_, _, body)| body.clone())
            .collect()
    }

    /// Every request as `(method, url)`, oldest first
    pub fn log(&self) -> Vec<(Method, String)> {
        self.requests
            .lock()
            .iter()
            .map(|(m, u, _)| (*m, u.clone()))
            .collect()
    }

    fn respond(&self, method: Method, url: &str, body: &[u8]) -> Result<HttpResponse, AcmeError> {
        self.requests
            .lock()
            .push((method, url.to_string(), body.to_vec()));

        let mut scripts = self.scripts.lock();
        if let Some(queue) = scripts.get_mut(&(method, url.to_string())) {
            let response = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(response) = response {
                return Ok(response);
            }
        }

        if method == Method::Head && url.ends_with("/directory") {
            let n = self.nonces.fetch_add(1, Ordering::SeqCst);
            return Ok(HttpResponse::new(200, Vec::new())
                .with_header("Replay-Nonce", &format!("nonce-{}", n)));
        }

        Ok(HttpResponse::new(404, "not found"))
    }
}

impl HttpTransport for FakeHttp {
    fn head(&self, url: &str) -> Result<HttpResponse, AcmeError> {
        self.respond(Method::Head, url, &[])
    }

    fn get(&self, url: &str) -> Result<HttpResponse, AcmeError> {
        self.respond(Method::Get, url, &[])
    }

    fn post(&self, url: &str, body: &[u8]) -> Result<HttpResponse, AcmeError> {
        self.respond(Method::Post, url, body)
    }
}

// ============================================================================
// Time
// ============================================================================

/// Fixed "now"
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Records requested sleeps without blocking
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

// ============================================================================
// DNS
// ============================================================================

pub const TEST_NAMESERVER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 53));

/// Authoritative server whose TXT answers are scripted per lookup
#[derive(Default)]
pub struct ScriptedResolver {
    answers: Mutex<VecDeque<Vec<String>>>,
    lookups: Mutex<Vec<(IpAddr, String)>>,
}

impl ScriptedResolver {
    /// Each lookup pops one answer; once exhausted, lookups return nothing
    pub fn with_answers(answers: Vec<Vec<String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn lookups(&self) -> Vec<(IpAddr, String)> {
        self.lookups.lock().clone()
    }
}

impl DnsResolver for ScriptedResolver {
    fn authoritative_nameserver(&self, _domain: &str) -> Result<IpAddr, AcmeError> {
        Ok(TEST_NAMESERVER)
    }

    fn txt_records(&self, nameserver: IpAddr, name: &str) -> Result<Vec<String>, AcmeError> {
        self.lookups.lock().push((nameserver, name.to_string()));
        Ok(self.answers.lock().pop_front().unwrap_or_default())
    }
}

/// Records hook invocations
#[derive(Default)]
pub struct RecordingHook {
    pub added: Mutex<Vec<(String, String)>>,
    pub deleted: Mutex<Vec<(String, String)>>,
}

impl DnsHook for RecordingHook {
    fn add(&self, domain: &str, value: &str) -> Result<(), AcmeError> {
        self.added.lock().push((domain.to_string(), value.to_string()));
        Ok(())
    }

    fn delete(&self, domain: &str, value: &str) -> Result<(), AcmeError> {
        self.deleted
            .lock()
            .push((domain.to_string(), value.to_string()));
        Ok(())
    }
}

// ============================================================================
// Remote hosts
// ============================================================================

/// Remote operation seen by [`RecordingTransfer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    Copy {
        host: String,
        remote: PathBuf,
        contents: Vec<u8>,
    },
    Remove {
        host: String,
        remote: PathBuf,
    },
    Exec {
        host: String,
        command: String,
    },
}

/// Records remote operations without touching the network
#[derive(Default)]
pub struct RecordingTransfer {
    ops: Mutex<Vec<RemoteOp>>,
}

impl RecordingTransfer {
    pub fn ops(&self) -> Vec<RemoteOp> {
        self.ops.lock().clone()
    }
}

impl RemoteTransfer for RecordingTransfer {
    fn copy(&self, local: &Path, host: &str, remote: &Path) -> Result<(), AcmeError> {
        let contents = std::fs::read(local)?;
        self.ops.lock().push(RemoteOp::Copy {
            host: host.to_string(),
            remote: remote.to_path_buf(),
            contents,
        });
        Ok(())
    }

    fn remove(&self, host: &str, remote: &Path) -> Result<(), AcmeError> {
        self.ops.lock().push(RemoteOp::Remove {
            host: host.to_string(),
            remote: remote.to_path_buf(),
        });
        Ok(())
    }

    fn exec(&self, host: &str, command: &str) -> Result<(), AcmeError> {
        self.ops.lock().push(RemoteOp::Exec {
            host: host.to_string(),
            command: command.to_string(),
        });
        Ok(())
    }
}
