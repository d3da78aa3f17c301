//! Password hashing with Argon2id.
//!
//! Hashes are PHC strings carrying their own salt and parameters, so stored
//! hashes keep verifying after the defaults change.
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("hash password: {0}")]
    Hash(String),
}

/// Hash `plain` with a fresh random salt into a PHC string.
///
/// This is CPU-bound; async callers should run it on a blocking thread.
pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| PasswordError::Hash(err.to_string()))
}

/// Returns `false` for a wrong password and for a malformed stored hash.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// Spend the cost of one verification against a throwaway hash.
///
/// Login calls this when the email is unknown so the response time does not
/// reveal which accounts exist.
pub fn verify_password_dummy(plain: &str) {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
    if let Some(hash) = DUMMY_HASH.get_or_init(|| hash_password("gatehouse-dummy").ok()) {
        let _ = verify_password(plain, hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("admin123").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("admin123", &hash));
        assert!(!verify_password("admin124", &hash));
    }

    #[test]
    fn same_password_hashes_differently() {
        let first = hash_password("secret").expect("hash");
        let second = hash_password("secret").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("secret", "plaintext-secret"));
        assert!(!verify_password("secret", ""));
    }

    #[test]
    fn dummy_verification_does_not_panic() {
        verify_password_dummy("anything");
        verify_password_dummy("");
    }
}
