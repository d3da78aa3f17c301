//! Bearer token issuance and verification.
//!
//! # Purpose
//! Mint short-lived access tokens after a successful login and turn presented
//! tokens back into claims on every authenticated request.
//!
//! # Key invariants
//! - Tokens are always EdDSA (Ed25519); other algorithms are rejected.
//! - `iss`, `aud`, `exp` and `user_id` are mandatory and validated.
//! - Every verification failure surfaces as [`TokenError::Invalid`]; the
//!   underlying reason is only logged at `debug`.
//! - The private key is a 32-byte Ed25519 seed and the public key must match it.
//!
//! # Key rotation
//! New tokens are signed with [`TokenKeys::current`] and carry its `kid`.
//! Verification tries the key named by `kid` first, then every other key, so
//! tokens minted before a rotation stay valid until they expire.
//!
//! # Examples
//! ```rust
//! use gatehouse_authz::UserId;
//! use gatehouse_authz::token::{TokenIssuer, TokenVerifier, generate_token_keys};
//! use std::time::Duration;
//!
//! let keys = generate_token_keys();
//! let issuer = TokenIssuer::new("gatehouse", "gatehouse-api", keys.clone()).expect("issuer");
//! let verifier = TokenVerifier::new("gatehouse", "gatehouse-api", 0, &keys).expect("verifier");
//! let token = issuer.issue(UserId::new(7), Duration::from_secs(60)).expect("token");
//! assert_eq!(verifier.verify(&token).expect("claims").user_id(), UserId::new(7));
//! ```
use crate::UserId;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

const ED25519_KEY_LEN: usize = 32;

/// Longest lifetime [`TokenIssuer::issue`] accepts: 30 days.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub aud: String,
    pub user_id: i64,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn user_id(&self) -> UserId {
        UserId::new(self.user_id)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("key error: {0}")]
    Key(String),
    #[error("token lifetime must be between 1 and {max} seconds, got {0:?}", max = MAX_TOKEN_TTL.as_secs())]
    Lifetime(Duration),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Ed25519 key material plus the `kid` advertised in token headers.
#[derive(Clone)]
pub struct TokenKey {
    pub kid: String,
    pub private_key: [u8; ED25519_KEY_LEN],
    pub public_key: [u8; ED25519_KEY_LEN],
}

impl std::fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKey")
            .field("kid", &self.kid)
            .field("private_key", &"<redacted>")
            .field("public_key", &hex::encode(self.public_key))
            .finish()
    }
}

impl TokenKey {
    /// Derive the public key and a stable `kid` from a raw seed.
    pub fn from_seed(seed: [u8; ED25519_KEY_LEN]) -> Self {
        let public_key = Ed25519SigningKey::from_bytes(&seed)
            .verifying_key()
            .to_bytes();
        Self {
            kid: format!("k-{}", hex::encode(&public_key[..8])),
            private_key: seed,
            public_key,
        }
    }

    pub fn from_seed_hex(seed_hex: &str) -> Result<Self, TokenError> {
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|err| TokenError::Key(format!("decode signing seed: {err}")))?;
        let seed: [u8; ED25519_KEY_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            TokenError::Key(format!(
                "signing seed must be {ED25519_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_seed(seed))
    }

    pub fn validate(&self) -> Result<(), TokenError> {
        let expected = Ed25519SigningKey::from_bytes(&self.private_key)
            .verifying_key()
            .to_bytes();
        if expected != self.public_key {
            return Err(TokenError::Key(
                "Ed25519 public key does not match private seed".to_string(),
            ));
        }
        Ok(())
    }

    fn encoding_key(&self) -> Result<EncodingKey, TokenError> {
        // jsonwebtoken takes EdDSA signing keys as PKCS8 DER.
        let der = Ed25519SigningKey::from_bytes(&self.private_key)
            .to_pkcs8_der()
            .map_err(|err| TokenError::Key(format!("encode Ed25519 key: {err}")))?;
        Ok(EncodingKey::from_ed_der(der.as_bytes()))
    }

    fn decoding_key(&self) -> Result<DecodingKey, TokenError> {
        let x = URL_SAFE_NO_PAD.encode(self.public_key);
        Ok(DecodingKey::from_ed_components(&x)?)
    }
}

/// The active signing key and the retired keys still accepted for verification.
#[derive(Debug, Clone)]
pub struct TokenKeys {
    pub current: TokenKey,
    pub previous: Vec<TokenKey>,
}

impl TokenKeys {
    pub fn from_seed_hex(current: &str, previous: &[String]) -> Result<Self, TokenError> {
        let keys = Self {
            current: TokenKey::from_seed_hex(current)?,
            previous: previous
                .iter()
                .map(|seed| TokenKey::from_seed_hex(seed))
                .collect::<Result<_, _>>()?,
        };
        keys.validate()?;
        Ok(keys)
    }

    pub fn validate(&self) -> Result<(), TokenError> {
        self.current.validate()?;
        for key in &self.previous {
            key.validate()?;
        }
        Ok(())
    }

    /// Current key first, then previous keys in rotation order.
    pub fn all_keys(&self) -> impl Iterator<Item = &TokenKey> {
        std::iter::once(&self.current).chain(self.previous.iter())
    }
}

/// Fresh random signing keys with no rotation history.
pub fn generate_token_keys() -> TokenKeys {
    let mut seed = [0u8; ED25519_KEY_LEN];
    rand::thread_rng().fill_bytes(&mut seed);
    TokenKeys {
        current: TokenKey::from_seed(seed),
        previous: Vec::new(),
    }
}

pub struct TokenIssuer {
    issuer: String,
    audience: String,
    kid: String,
    encoding_key: EncodingKey,
}

impl TokenIssuer {
    /// Build an issuer that signs with `keys.current`.
    ///
    /// # Errors
    /// Returns [`TokenError::Key`] when the key pair is malformed or mismatched.
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        keys: TokenKeys,
    ) -> Result<Self, TokenError> {
        keys.validate()?;
        Ok(Self {
            issuer: issuer.into(),
            audience: audience.into(),
            encoding_key: keys.current.encoding_key()?,
            kid: keys.current.kid,
        })
    }

    /// Mint a token for `user_id` that expires `ttl` from now.
    ///
    /// # Errors
    /// Returns [`TokenError::Lifetime`] when `ttl` is zero or longer than
    /// [`MAX_TOKEN_TTL`], and [`TokenError::Jwt`] if signing fails.
    pub fn issue(&self, user_id: UserId, ttl: Duration) -> Result<String, TokenError> {
        if ttl.as_secs() == 0 || ttl > MAX_TOKEN_TTL {
            return Err(TokenError::Lifetime(ttl));
        }
        let now = now_epoch_seconds();
        let exp = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| now.checked_add(secs))
            .ok_or(TokenError::Lifetime(ttl))?;
        let claims = AccessClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            user_id: user_id.get(),
            iat: now,
            exp,
        };
        self.sign(&claims)
    }

    /// Sign caller-built claims with the current key.
    pub fn sign(&self, claims: &AccessClaims) -> Result<String, TokenError> {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());
        Ok(jsonwebtoken::encode(&header, claims, &self.encoding_key)?)
    }
}

pub struct TokenVerifier {
    validation: Validation,
    keys: Vec<(String, DecodingKey)>,
}

impl TokenVerifier {
    /// Accept tokens for `issuer`/`audience` signed by any key in `keys`.
    /// `leeway_secs` is the clock skew tolerated on `exp`.
    pub fn new(
        issuer: &str,
        audience: &str,
        leeway_secs: u64,
        keys: &TokenKeys,
    ) -> Result<Self, TokenError> {
        keys.validate()?;
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_audience(&[audience]);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = leeway_secs;
        let keys = keys
            .all_keys()
            .map(|key| {
                key.decoding_key()
                    .map(|decoding| (key.kid.clone(), decoding))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { validation, keys })
    }

    /// Check signature, issuer, audience and expiry.
    ///
    /// # Errors
    /// Any failure is [`TokenError::Invalid`].
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let header = jsonwebtoken::decode_header(token).map_err(|err| {
            tracing::debug!(error = %err, "rejecting token with malformed header");
            TokenError::Invalid
        })?;
        let mut last_err = None;
        for (_, key) in self.ordered_keys(header.kid.as_deref()) {
            match jsonwebtoken::decode::<AccessClaims>(token, key, &self.validation) {
                Ok(data) => return Ok(data.claims),
                Err(err) => last_err = Some(err),
            }
        }
        if let Some(err) = last_err {
            tracing::debug!(error = %err, "token verification failed");
        }
        Err(TokenError::Invalid)
    }

    // The key named by `kid` goes first; the rest follow in rotation order.
    fn ordered_keys<'a>(
        &'a self,
        kid: Option<&'a str>,
    ) -> impl Iterator<Item = &'a (String, DecodingKey)> + 'a {
        let named = self
            .keys
            .iter()
            .filter(move |(key_kid, _)| Some(key_kid.as_str()) == kid);
        let rest = self
            .keys
            .iter()
            .filter(move |(key_kid, _)| Some(key_kid.as_str()) != kid);
        named.chain(rest)
    }
}

fn now_epoch_seconds() -> i64 {
    // Clamp to zero if the clock is before the epoch.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISS: &str = "gatehouse";
    const AUD: &str = "gatehouse-api";

    fn keys_from(seed: u8) -> TokenKeys {
        TokenKeys {
            current: TokenKey::from_seed([seed; 32]),
            previous: Vec::new(),
        }
    }

    fn pair(keys: &TokenKeys) -> (TokenIssuer, TokenVerifier) {
        (
            TokenIssuer::new(ISS, AUD, keys.clone()).expect("issuer"),
            TokenVerifier::new(ISS, AUD, 0, keys).expect("verifier"),
        )
    }

    #[test]
    fn issued_token_verifies_before_expiry() {
        let keys = keys_from(5);
        let (issuer, verifier) = pair(&keys);
        let token = issuer
            .issue(UserId::new(42), Duration::from_secs(60))
            .expect("issue");
        let claims = verifier.verify(&token).expect("verify");
        assert_eq!(claims.user_id(), UserId::new(42));
        assert_eq!(claims.iss, ISS);
        assert_eq!(claims.aud, AUD);
        assert_eq!(claims.exp - claims.iat, 60);
        let header = jsonwebtoken::decode_header(&token).expect("header");
        assert_eq!(header.alg, Algorithm::EdDSA);
        assert_eq!(header.kid.as_deref(), Some(keys.current.kid.as_str()));
    }

    #[test]
    fn expired_token_is_invalid() {
        let (issuer, verifier) = pair(&keys_from(5));
        let now = now_epoch_seconds();
        let token = issuer
            .sign(&AccessClaims {
                iss: ISS.to_string(),
                aud: AUD.to_string(),
                user_id: 1,
                iat: now - 120,
                exp: now - 10,
            })
            .expect("sign");
        assert!(matches!(verifier.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn out_of_range_lifetimes_are_rejected_at_issue() {
        let (issuer, verifier) = pair(&keys_from(5));
        for secs in [0, MAX_TOKEN_TTL.as_secs() + 1, i64::MAX as u64, u64::MAX] {
            let result = issuer.issue(UserId::new(1), Duration::from_secs(secs));
            assert!(
                matches!(result, Err(TokenError::Lifetime(_))),
                "ttl {secs} gave {result:?}"
            );
        }
        let token = issuer.issue(UserId::new(1), MAX_TOKEN_TTL).expect("issue");
        let claims = verifier.verify(&token).expect("verify");
        assert_eq!(claims.exp - claims.iat, MAX_TOKEN_TTL.as_secs() as i64);
    }

    #[test]
    fn token_signed_by_unknown_key_is_invalid() {
        let (issuer, _) = pair(&keys_from(5));
        let (_, verifier) = pair(&keys_from(6));
        let token = issuer
            .issue(UserId::new(1), Duration::from_secs(60))
            .expect("issue");
        assert!(matches!(verifier.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn wrong_audience_is_invalid() {
        let keys = keys_from(5);
        let issuer = TokenIssuer::new(ISS, "someone-else", keys.clone()).expect("issuer");
        let verifier = TokenVerifier::new(ISS, AUD, 0, &keys).expect("verifier");
        let token = issuer
            .issue(UserId::new(1), Duration::from_secs(60))
            .expect("issue");
        assert!(matches!(verifier.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn garbage_is_invalid() {
        let (_, verifier) = pair(&keys_from(5));
        for token in ["", "not-a-jwt", "a.b.c"] {
            assert!(matches!(verifier.verify(token), Err(TokenError::Invalid)));
        }
    }

    #[test]
    fn rotated_key_still_verifies_old_tokens() {
        let old = keys_from(5);
        let (old_issuer, _) = pair(&old);
        let token = old_issuer
            .issue(UserId::new(9), Duration::from_secs(60))
            .expect("issue");

        let rotated = TokenKeys {
            current: TokenKey::from_seed([6; 32]),
            previous: vec![old.current.clone()],
        };
        let (new_issuer, verifier) = pair(&rotated);
        assert_eq!(
            verifier.verify(&token).expect("old token").user_id(),
            UserId::new(9)
        );
        let fresh = new_issuer
            .issue(UserId::new(10), Duration::from_secs(60))
            .expect("issue");
        assert_eq!(
            verifier.verify(&fresh).expect("new token").user_id(),
            UserId::new(10)
        );
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let mut keys = keys_from(5);
        keys.current.public_key = [0u8; 32];
        assert!(matches!(keys.validate(), Err(TokenError::Key(_))));
        assert!(TokenIssuer::new(ISS, AUD, keys).is_err());
    }

    #[test]
    fn seed_hex_must_be_32_bytes() {
        assert!(TokenKey::from_seed_hex("abcd").is_err());
        assert!(TokenKey::from_seed_hex("zz").is_err());
        let key = TokenKey::from_seed_hex(&hex::encode([7u8; 32])).expect("seed");
        assert_eq!(key.private_key, [7u8; 32]);
        let keys = TokenKeys::from_seed_hex(&hex::encode([7u8; 32]), &[hex::encode([8u8; 32])])
            .expect("keys");
        assert_eq!(keys.all_keys().count(), 2);
    }

    #[test]
    fn debug_output_redacts_private_key() {
        let key = TokenKey::from_seed([9u8; 32]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&hex::encode([9u8; 32])));
    }
}
