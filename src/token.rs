//! Provider token signing and caching.
//!
//! Every request carries `authorization: bearer <jwt>` where the JWT is an
//! ES256-signed `{iss, iat}` claim set with the key id in its header. Signing
//! is local and cheap, so tokens are produced on demand and cached until they
//! reach the rotation interval.
//!
//! # Concurrency
//!
//! The cached token is an immutable value behind an [`ArcSwapOption`].
//! Readers load a snapshot without locking; rotation stores a whole new
//! value. Two callers racing past the rotation deadline may both sign, and
//! the last store wins. Both tokens are valid.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use p256::ecdsa::signature::RandomizedSigner;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::rand_core::OsRng;
use p256::pkcs8::DecodePrivateKey;
use serde::Serialize;

use crate::constants::TOKEN_ALGORITHM;
use crate::error::PushError;

#[derive(Serialize)]
struct Header<'a> {
    alg: &'a str,
    kid: &'a str,
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    iat: i64,
}

/// A signed provider token and the moment it was issued.
#[derive(Debug)]
struct SigningToken {
    value: String,
    issued_at: Instant,
}

/// Signs, caches and invalidates the provider token.
pub struct TokenSigner {
    team_id: String,
    key_id: String,
    key: SigningKey,
    rotation_interval: Duration,
    current: ArcSwapOption<SigningToken>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("team_id", &self.team_id)
            .field("key_id", &self.key_id)
            .field("rotation_interval", &self.rotation_interval)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Create a signer for `team_id` using `key`, published under `key_id`.
    pub fn new(
        team_id: impl Into<String>,
        key_id: impl Into<String>,
        key: SigningKey,
        rotation_interval: Duration,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            key_id: key_id.into(),
            key,
            rotation_interval,
            current: ArcSwapOption::empty(),
        }
    }

    /// Create a signer from a PKCS#8 PEM private key (the `.p8` file format).
    pub fn from_pkcs8_pem(
        team_id: impl Into<String>,
        key_id: impl Into<String>,
        pem: &str,
        rotation_interval: Duration,
    ) -> Result<Self, PushError> {
        let key = SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| PushError::Credential(format!("invalid PKCS#8 signing key: {e}")))?;
        Ok(Self::new(team_id, key_id, key, rotation_interval))
    }

    /// Return a token younger than the rotation interval, signing a new one
    /// if the cached token is missing or too old.
    pub fn token(&self) -> Result<String, PushError> {
        if let Some(cached) = self.current.load_full() {
            if cached.issued_at.elapsed() < self.rotation_interval {
                return Ok(cached.value.clone());
            }
            log::debug!("[Token] Cached token reached rotation interval, re-signing");
        }

        let issued_at = Instant::now();
        let value = self.sign(chrono::Utc::now().timestamp())?;
        self.current.store(Some(Arc::new(SigningToken {
            value: value.clone(),
            issued_at,
        })));
        Ok(value)
    }

    /// Drop the cached token so the next [`TokenSigner::token`] call signs
    /// a fresh one regardless of age.
    pub fn invalidate(&self) {
        if self.current.swap(None).is_some() {
            log::info!("[Token] Provider token invalidated");
        }
    }

    /// Rotation interval this signer was built with.
    pub fn rotation_interval(&self) -> Duration {
        self.rotation_interval
    }

    fn sign(&self, issued_at_secs: i64) -> Result<String, PushError> {
        let header = serde_json::to_vec(&Header {
            alg: TOKEN_ALGORITHM,
            kid: &self.key_id,
        })
        .map_err(|e| PushError::Credential(e.to_string()))?;
        let claims = serde_json::to_vec(&Claims {
            iss: &self.team_id,
            iat: issued_at_secs,
        })
        .map_err(|e| PushError::Credential(e.to_string()))?;

        let signing_input = format!("{}.{}", BASE64URL.encode(header), BASE64URL.encode(claims));
        let signature: Signature = self
            .key
            .try_sign_with_rng(&mut OsRng, signing_input.as_bytes())
            .map_err(|e| PushError::Credential(format!("ES256 signing failed: {e}")))?;

        Ok(format!("{signing_input}.{}", BASE64URL.encode(signature.to_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::VerifyingKey;

    fn signer(rotation: Duration) -> TokenSigner {
        TokenSigner::new("TEAM123456", "KEY1234567", SigningKey::random(&mut OsRng), rotation)
    }

    fn decode_json(part: &str) -> serde_json::Value {
        let bytes = BASE64URL.decode(part).expect("base64url segment");
        serde_json::from_slice(&bytes).expect("json segment")
    }

    #[test]
    fn test_token_structure_and_signature() {
        let signer = signer(Duration::from_secs(60));
        let token = signer.token().expect("sign");

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3, "JWS compact form has three segments");

        let header = decode_json(parts[0]);
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["kid"], "KEY1234567");

        let claims = decode_json(parts[1]);
        assert_eq!(claims["iss"], "TEAM123456");
        let iat = claims["iat"].as_i64().expect("iat is integer seconds");
        assert!((chrono::Utc::now().timestamp() - iat).abs() <= 2);

        let sig_bytes = BASE64URL.decode(parts[2]).expect("signature");
        assert_eq!(sig_bytes.len(), 64, "ES256 signature is r || s");
        let signature = Signature::from_slice(&sig_bytes).expect("signature bytes");
        let verifying_key = VerifyingKey::from(&signer.key);
        let signing_input = format!("{}.{}", parts[0], parts[1]);
        assert!(verifying_key.verify(signing_input.as_bytes(), &signature).is_ok());
    }

    #[test]
    fn test_token_cached_within_interval() {
        let signer = signer(Duration::from_secs(60));
        let first = signer.token().unwrap();
        let second = signer.token().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalidate_forces_fresh_token() {
        let signer = signer(Duration::from_secs(60));
        let first = signer.token().unwrap();
        signer.invalidate();
        let second = signer.token().unwrap();
        assert_ne!(first, second);
        // And the fresh one is cached again.
        assert_eq!(second, signer.token().unwrap());
    }

    #[test]
    fn test_token_rotates_after_interval() {
        let signer = signer(Duration::from_millis(20));
        let first = signer.token().unwrap();
        std::thread::sleep(Duration::from_millis(40));
        let second = signer.token().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_zero_interval_never_reuses() {
        let signer = signer(Duration::ZERO);
        let first = signer.token().unwrap();
        let second = signer.token().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_from_pkcs8_pem() {
        use p256::pkcs8::{EncodePrivateKey, LineEnding};

        let key = SigningKey::random(&mut OsRng);
        let pem = key.to_pkcs8_pem(LineEnding::LF).expect("encode pem");
        let signer = TokenSigner::from_pkcs8_pem("TEAM", "KID", &pem, Duration::from_secs(60))
            .expect("load pem");
        assert!(signer.token().is_ok());

        let err = TokenSigner::from_pkcs8_pem("TEAM", "KID", "not a key", Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, PushError::Credential(_)));
    }

    #[test]
    fn test_concurrent_readers_see_whole_tokens() {
        let signer = Arc::new(signer(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let signer = Arc::clone(&signer);
                std::thread::spawn(move || signer.token().unwrap())
            })
            .collect();
        for handle in handles {
            let token = handle.join().unwrap();
            assert_eq!(token.split('.').count(), 3);
        }
    }
}
