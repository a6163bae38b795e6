//! Sealed, self-contained session tokens.
//!
//! A token is the URL-safe base64 encoding of `nonce || ciphertext || tag`,
//! produced by ChaCha20-Poly1305 over a small JSON document:
//!
//! ```text
//! { "issued_at": <unix seconds>, "expire_after": <ttl seconds>, "payload": "<identity>" }
//! ```
//!
//! Sealing (rather than signing) keeps the identity opaque at rest. Expiry is
//! embedded in the token, so verification needs only the key and the current
//! time: no shared state, no revocation list.

use std::fmt;
use std::time::Duration;

use base64::prelude::*;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// Default token lifetime: one day.
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

/// How far in the future an `issued_at` may lie before the token is rejected.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// BLAKE3 context string for deriving a key from a passphrase secret.
const KEY_DERIVATION_CONTEXT: &str = "vds-broker token sealing key v1";

/// An issued token, as handed to clients.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Return the encoded token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the token, returning the encoded string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(<{} bytes>)", self.0.len())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The document sealed inside a token.
#[derive(Debug, Serialize, Deserialize)]
struct SealedClaims {
    issued_at: i64,
    expire_after: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
}

/// Issues and verifies sealed tokens under one symmetric key.
pub struct TokenService {
    cipher: ChaCha20Poly1305,
    ttl: Duration,
}

impl TokenService {
    /// Create a token service from raw key bytes, with the default TTL.
    #[must_use]
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.into()),
            ttl: DEFAULT_TTL,
        }
    }

    /// Create a token service with a freshly generated random key.
    ///
    /// Tokens issued by such a service cannot be verified after a restart.
    #[must_use]
    pub fn generate() -> Self {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        Self {
            cipher: ChaCha20Poly1305::new(&key),
            ttl: DEFAULT_TTL,
        }
    }

    /// Create a token service from a configured secret.
    ///
    /// The secret may be 64 hex characters, URL-safe base64 of 32 bytes, or an
    /// arbitrary passphrase (a key is derived from it with BLAKE3).
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidKey` if the secret is empty.
    pub fn from_secret(secret: &str) -> Result<Self> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(AuthError::InvalidKey("token secret is empty".to_string()));
        }

        if let Some(key) = decode_raw_key(secret) {
            return Ok(Self::new(&key));
        }

        tracing::debug!("Deriving token key from passphrase secret");
        Ok(Self::new(&blake3::derive_key(
            KEY_DERIVATION_CONTEXT,
            secret.as_bytes(),
        )))
    }

    /// Override the token lifetime.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The token lifetime.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token carrying `payload`, stamped with the current time.
    #[must_use]
    pub fn issue(&self, payload: &str) -> Token {
        self.issue_at(payload, Utc::now())
    }

    /// Issue a token carrying `payload`, stamped with `issued_at`.
    ///
    /// # Panics
    ///
    /// Panics only if the AEAD rejects a plaintext, which cannot happen for a
    /// document of this size.
    #[must_use]
    pub fn issue_at(&self, payload: &str, issued_at: DateTime<Utc>) -> Token {
        let claims = SealedClaims {
            issued_at: issued_at.timestamp(),
            expire_after: self.ttl.as_secs(),
            payload: Some(payload.to_string()),
        };
        self.seal(&claims)
    }

    /// Verify a token and return its payload.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenExpired` or `AuthError::InvalidToken`.
    pub fn verify(&self, token: &str) -> Result<String> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as of `now` and return its payload.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` if the token is not valid base64, fails
    /// authentication, does not parse, lacks a payload, or was issued too far in
    /// the future; `AuthError::TokenExpired` if it is older than the TTL.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<String> {
        let claims = self.open(token)?;

        let age = now.timestamp().saturating_sub(claims.issued_at);
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        if age > ttl {
            return Err(AuthError::TokenExpired);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(AuthError::InvalidToken(
                "token issued in the future".to_string(),
            ));
        }

        claims
            .payload
            .ok_or_else(|| AuthError::InvalidToken("missing payload".to_string()))
    }

    fn seal(&self, claims: &SealedClaims) -> Token {
        let plaintext = serde_json::to_vec(claims).expect("token claims serialize");
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .expect("token plaintext is within AEAD limits");

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Token(BASE64_URL_SAFE_NO_PAD.encode(sealed))
    }

    fn open(&self, token: &str) -> Result<SealedClaims> {
        let sealed = BASE64_URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| AuthError::InvalidToken(format!("invalid encoding: {e}")))?;

        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(AuthError::InvalidToken("token too short".to_string()));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| AuthError::InvalidToken("token corrupted".to_string()))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| AuthError::InvalidToken(format!("payload deserialization error: {e}")))
    }
}

/// Decode a secret that is literally a 32-byte key (hex or URL-safe base64).
fn decode_raw_key(secret: &str) -> Option<[u8; 32]> {
    if secret.len() == 64 {
        if let Some(key) = hex::decode(secret).ok().and_then(|b| b.try_into().ok()) {
            return Some(key);
        }
    }

    BASE64_URL_SAFE
        .decode(secret)
        .or_else(|_| BASE64_URL_SAFE_NO_PAD.decode(secret))
        .ok()
        .and_then(|b| b.try_into().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&[7u8; 32])
    }

    fn flip_bit(token: &Token, byte: usize, bit: u8) -> String {
        let mut raw = BASE64_URL_SAFE_NO_PAD.decode(token.as_str()).unwrap();
        raw[byte] ^= 1 << bit;
        BASE64_URL_SAFE_NO_PAD.encode(raw)
    }

    #[test]
    fn verify_returns_issued_payload() {
        let tokens = service();
        for payload in ["alice", "bob@corp.example.com", "ünïcødé"] {
            let token = tokens.issue(payload);
            assert_eq!(tokens.verify(token.as_str()).unwrap(), payload);
        }
    }

    #[test]
    fn ciphertext_is_randomized() {
        let tokens = service();
        let a = tokens.issue("alice");
        let b = tokens.issue("alice");
        assert_ne!(a, b);
    }

    #[test]
    fn token_does_not_leak_payload() {
        let token = service().issue("alice");
        assert!(!token.as_str().contains("alice"));
        assert!(!format!("{token:?}").contains(token.as_str()));
    }

    #[test]
    fn token_valid_up_to_ttl() {
        let tokens = service();
        let now = Utc::now();
        let issued = now - chrono::Duration::seconds(86_400);
        let token = tokens.issue_at("alice", issued);
        assert_eq!(tokens.verify_at(token.as_str(), now).unwrap(), "alice");
    }

    #[test]
    fn token_expires_after_ttl() {
        let tokens = service();
        let now = Utc::now();
        let issued = now - chrono::Duration::seconds(86_401);
        let token = tokens.issue_at("alice", issued);
        let result = tokens.verify_at(token.as_str(), now);
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[test]
    fn custom_ttl_applies() {
        let tokens = service().with_ttl(Duration::from_secs(10));
        let now = Utc::now();
        let token = tokens.issue_at("alice", now - chrono::Duration::seconds(11));
        assert!(tokens.verify_at(token.as_str(), now).is_err());
    }

    #[test]
    fn future_token_rejected() {
        let tokens = service();
        let now = Utc::now();
        let token = tokens.issue_at("alice", now + chrono::Duration::seconds(600));
        let result = tokens.verify_at(token.as_str(), now);
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));

        // Small skew is tolerated.
        let token = tokens.issue_at("alice", now + chrono::Duration::seconds(30));
        assert!(tokens.verify_at(token.as_str(), now).is_ok());
    }

    #[test]
    fn single_bit_flips_rejected() {
        let tokens = service();
        let token = tokens.issue("alice");
        let len = BASE64_URL_SAFE_NO_PAD.decode(token.as_str()).unwrap().len();

        for byte in [0, NONCE_LEN - 1, NONCE_LEN, len / 2, len - TAG_LEN, len - 1] {
            for bit in [0, 3, 7] {
                let tampered = flip_bit(&token, byte, bit);
                let result = tokens.verify(&tampered);
                assert!(
                    matches!(result, Err(AuthError::InvalidToken(_))),
                    "flip at byte {byte} bit {bit} was accepted"
                );
            }
        }
    }

    #[test]
    fn wrong_key_rejected() {
        let token = service().issue("alice");
        let other = TokenService::new(&[8u8; 32]);
        assert!(matches!(
            other.verify(token.as_str()),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn garbage_rejected() {
        let tokens = service();
        for garbage in ["", "not base64!!", "AAAA", "dG9rZW4"] {
            assert!(
                matches!(tokens.verify(garbage), Err(AuthError::InvalidToken(_))),
                "{garbage:?} was accepted"
            );
        }
    }

    #[test]
    fn missing_payload_rejected() {
        let tokens = service();
        let token = tokens.seal(&SealedClaims {
            issued_at: Utc::now().timestamp(),
            expire_after: 86_400,
            payload: None,
        });
        let result = tokens.verify(token.as_str());
        assert!(matches!(result, Err(AuthError::InvalidToken(msg)) if msg.contains("payload")));
    }

    #[test]
    fn from_secret_hex() {
        let hex_key = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let a = TokenService::from_secret(hex_key).unwrap();
        let b = TokenService::new(&hex::decode(hex_key).unwrap().try_into().unwrap());
        let token = a.issue("alice");
        assert_eq!(b.verify(token.as_str()).unwrap(), "alice");
    }

    #[test]
    fn from_secret_base64() {
        let key = [42u8; 32];
        let encoded = BASE64_URL_SAFE.encode(key);
        let a = TokenService::from_secret(&encoded).unwrap();
        let b = TokenService::new(&key);
        let token = a.issue("alice");
        assert_eq!(b.verify(token.as_str()).unwrap(), "alice");
    }

    #[test]
    fn from_secret_passphrase_is_deterministic() {
        let a = TokenService::from_secret("correct horse battery staple").unwrap();
        let b = TokenService::from_secret("correct horse battery staple").unwrap();
        let c = TokenService::from_secret("another passphrase").unwrap();

        let token = a.issue("alice");
        assert_eq!(b.verify(token.as_str()).unwrap(), "alice");
        assert!(c.verify(token.as_str()).is_err());
    }

    #[test]
    fn from_secret_rejects_empty() {
        assert!(matches!(
            TokenService::from_secret("  "),
            Err(AuthError::InvalidKey(_))
        ));
    }

    #[test]
    fn generated_keys_differ() {
        let a = TokenService::generate();
        let b = TokenService::generate();
        let token = a.issue("alice");
        assert_eq!(a.verify(token.as_str()).unwrap(), "alice");
        assert!(b.verify(token.as_str()).is_err());
    }
}
