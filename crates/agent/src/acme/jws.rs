//! Signed request envelopes
//!
//! The CA speaks the early ACME dialect: every POST body is a JSON object
//! carrying the unprotected `header` (algorithm and account JWK) next to the
//! base64url `protected` header (the same plus the replay nonce), the
//! base64url `payload`, and an RS256 `signature` over
//! `protected + "." + payload`.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer as _, Verifier as _};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::trace;

use super::error::AcmeError;

/// Only algorithm the dialect supports
pub const ALGORITHM: &str = "RS256";

/// Base64url without padding
pub fn b64url(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Big-endian unsigned integer, minimal length, as base64url.
///
/// The byte form never has a leading zero nibble problem: an exponent such
/// as 65537 (`0x10001`, odd hex length) encodes as `AQAB`.
fn encode_uint(value: &BigUint) -> String {
    b64url(value.to_bytes_be())
}

// ============================================================================
// JSON Web Key
// ============================================================================

/// RSA public key as a JSON Web Key.
///
/// Field order is the lexicographic member order, so serializing this struct
/// yields the canonical form the thumbprint is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub e: String,
    pub kty: String,
    pub n: String,
}

impl Jwk {
    pub fn from_public_key(key: &RsaPublicKey) -> Self {
        Self {
            e: encode_uint(key.e()),
            kty: "RSA".to_string(),
            n: encode_uint(key.n()),
        }
    }

    /// `base64url(SHA-256(canonical JWK))`, a pure function of `(n, e)`
    pub fn thumbprint(&self) -> String {
        let canonical = format!(
            r#"{{"e":"{}","kty":"{}","n":"{}"}}"#,
            self.e, self.kty, self.n
        );
        b64url(Sha256::digest(canonical.as_bytes()))
    }

    /// Rebuild the RSA public key
    pub fn to_public_key(&self) -> Result<RsaPublicKey, AcmeError> {
        let decode = |field: &str, value: &str| {
            URL_SAFE_NO_PAD
                .decode(value)
                .map_err(|e| AcmeError::Crypto(format!("JWK '{}' is not base64url: {}", field, e)))
        };
        let n = BigUint::from_bytes_be(&decode("n", &self.n)?);
        let e = BigUint::from_bytes_be(&decode("e", &self.e)?);
        RsaPublicKey::new(n, e).map_err(|e| AcmeError::Crypto(format!("invalid JWK: {}", e)))
    }
}

// ============================================================================
// Signer
// ============================================================================

/// Holder of the account private key
pub trait Signer: Send + Sync {
    /// Public half as a JWK
    fn jwk(&self) -> &Jwk;

    /// RS256 signature over `message`
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, AcmeError>;
}

/// The account RSA keypair
#[derive(Clone)]
pub struct AccountKey {
    signing_key: SigningKey<Sha256>,
    jwk: Jwk,
    bits: usize,
}

impl AccountKey {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        let jwk = Jwk::from_public_key(&private_key.to_public_key());
        let bits = private_key.size() * 8;
        Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
            jwk,
            bits,
        }
    }

    /// Modulus length in bits
    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn thumbprint(&self) -> String {
        self.jwk.thumbprint()
    }
}

impl Signer for AccountKey {
    fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, AcmeError> {
        let signature = self
            .signing_key
            .try_sign(message)
            .map_err(|e| AcmeError::Crypto(format!("signing failed: {}", e)))?;
        Ok(signature.to_vec())
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("bits", &self.bits)
            .field("thumbprint", &self.jwk.thumbprint())
            .finish()
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Unprotected header: algorithm plus account key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsHeader {
    pub alg: String,
    pub jwk: Jwk,
}

/// Protected header: the unprotected header with the nonce substituted in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub alg: String,
    pub jwk: Jwk,
    pub nonce: String,
}

/// The POST body sent to the CA
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    pub header: JwsHeader,
    pub protected: String,
    pub payload: String,
    pub signature: String,
}

impl SignedRequest {
    /// Decode the protected header
    pub fn protected_header(&self) -> Result<ProtectedHeader, AcmeError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(&self.protected)
            .map_err(|e| AcmeError::Crypto(format!("protected header is not base64url: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AcmeError::Crypto(format!("protected header is not JSON: {}", e)))
    }

    /// Decode the payload as JSON
    pub fn payload_json(&self) -> Result<serde_json::Value, AcmeError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(&self.payload)
            .map_err(|e| AcmeError::Crypto(format!("payload is not base64url: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AcmeError::Crypto(format!("payload is not JSON: {}", e)))
    }

    /// Check the signature against `jwk`
    pub fn verify(&self, jwk: &Jwk) -> Result<(), AcmeError> {
        let verifying_key = VerifyingKey::<Sha256>::new(jwk.to_public_key()?);
        let signature_bytes = URL_SAFE_NO_PAD
            .decode(&self.signature)
            .map_err(|e| AcmeError::Crypto(format!("signature is not base64url: {}", e)))?;
        let signature = Signature::try_from(signature_bytes.as_slice())
            .map_err(|e| AcmeError::Crypto(format!("malformed signature: {}", e)))?;

        let signing_input = format!("{}.{}", self.protected, self.payload);
        verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|e| AcmeError::Crypto(format!("signature mismatch: {}", e)))
    }
}

/// Builds signed envelopes for the account key
#[derive(Clone)]
pub struct RequestSigner {
    signer: Arc<dyn Signer>,
    header: JwsHeader,
}

impl RequestSigner {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        let header = JwsHeader {
            alg: ALGORITHM.to_string(),
            jwk: signer.jwk().clone(),
        };
        Self { signer, header }
    }

    /// Account thumbprint used in key authorizations
    pub fn thumbprint(&self) -> String {
        self.header.jwk.thumbprint()
    }

    pub fn jwk(&self) -> &Jwk {
        &self.header.jwk
    }

    /// Sign `payload` with `nonce` substituted into the protected header
    pub fn sign<T: Serialize + ?Sized>(
        &self,
        nonce: &str,
        payload: &T,
    ) -> Result<SignedRequest, AcmeError> {
        let payload_json = serde_json::to_vec(payload)
            .map_err(|e| AcmeError::Crypto(format!("payload serialization failed: {}", e)))?;
        let protected = ProtectedHeader {
            alg: self.header.alg.clone(),
            jwk: self.header.jwk.clone(),
            nonce: nonce.to_string(),
        };
        let protected_json = serde_json::to_vec(&protected)
            .map_err(|e| AcmeError::Crypto(format!("header serialization failed: {}", e)))?;

        let protected64 = b64url(&protected_json);
        let payload64 = b64url(&payload_json);
        let signature = self
            .signer
            .sign(format!("{}.{}", protected64, payload64).as_bytes())?;

        trace!(nonce = %nonce, payload_len = payload_json.len(), "Signed request");

        Ok(SignedRequest {
            header: self.header.clone(),
            protected: protected64,
            payload: payload64,
            signature: b64url(signature),
        })
    }
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("alg", &self.header.alg)
            .field("thumbprint", &self.thumbprint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::testing::test_account_key;
    use proptest::prelude::*;
    use serde_json::json;

    fn signer() -> RequestSigner {
        RequestSigner::new(Arc::new(test_account_key().clone()))
    }

    #[test]
    fn test_exponent_encoding() {
        // 0x10001 has an odd number of hex digits
        assert_eq!(encode_uint(&BigUint::from(65537u32)), "AQAB");
        assert_eq!(encode_uint(&BigUint::from(3u32)), "Aw");
        assert_eq!(encode_uint(&BigUint::from(0x100u32)), "AQA");
    }

    #[test]
    fn test_thumbprint_known_vector() {
        // RFC 7638 section 3.1
        let jwk = Jwk {
            e: "AQAB".to_string(),
            kty: "RSA".to_string(),
            n: "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw".to_string(),
        };
        assert_eq!(jwk.thumbprint(), "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs");
    }

    #[test]
    fn test_envelope_shape() {
        let signer = signer();
        let request = signer
            .sign("nonce-1", &json!({"resource": "new-reg"}))
            .unwrap();

        assert_eq!(request.header.alg, "RS256");
        assert_eq!(request.header.jwk, *signer.jwk());

        let protected = request.protected_header().unwrap();
        assert_eq!(protected.nonce, "nonce-1");
        assert_eq!(protected.jwk, *signer.jwk());
        assert_eq!(request.payload_json().unwrap(), json!({"resource": "new-reg"}));
        assert!(!request.protected.contains('='));
        assert!(!request.signature.contains('='));

        request.verify(signer.jwk()).unwrap();
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let request = signer().sign("n", &json!({})).unwrap();
        let other = AccountKey::new(
            RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap(),
        );
        assert!(request.verify(other.jwk()).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_signature_verifies(nonce in "[A-Za-z0-9_-]{1,40}", value in ".{0,64}") {
            let signer = signer();
            let request = signer.sign(&nonce, &json!({ "value": value })).unwrap();
            prop_assert!(request.verify(signer.jwk()).is_ok());
        }

        #[test]
        fn prop_tampering_breaks_signature(
            nonce in "[A-Za-z0-9]{4,16}",
            index in 0usize..64,
            tamper_payload in any::<bool>(),
        ) {
            let signer = signer();
            let mut request = signer
                .sign(&nonce, &json!({"resource": "new-authz", "identifier": {"type": "dns", "value": "example.com"}}))
                .unwrap();

            let target = if tamper_payload { &mut request.payload } else { &mut request.protected };
            let mut bytes = target.clone().into_bytes();
            let i = index % bytes.len();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            *target = String::from_utf8(bytes).unwrap();

            prop_assert!(request.verify(signer.jwk()).is_err());
        }

        #[test]
        fn prop_thumbprint_depends_on_n_and_e(n in "[A-Za-z0-9_-]{8,32}", e in "[A-Za-z0-9_-]{2,6}") {
            let jwk = Jwk { e: e.clone(), kty: "RSA".to_string(), n: n.clone() };
            prop_assert_eq!(jwk.thumbprint(), jwk.clone().thumbprint());

            let changed_n = Jwk { n: format!("{}x", n), ..jwk.clone() };
            let changed_e = Jwk { e: format!("{}x", e), ..jwk.clone() };
            prop_assert_ne!(jwk.thumbprint(), changed_n.thumbprint());
            prop_assert_ne!(jwk.thumbprint(), changed_e.thumbprint());
        }
    }
}
