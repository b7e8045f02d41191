//! Client secret and password hashing.
//!
//! Hashes are Argon2id PHC strings. Whether a stored value is already hashed
//! is decided by probing it as a PHC string, which makes re-hashing on save
//! idempotent. Verification goes through the Argon2 verifier, which compares
//! digests in constant time.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use rand::Rng;

use crate::error::AuthError;

/// Generates a random client secret: 32 bytes, hex encoded.
#[must_use]
pub fn generate_client_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    hex::encode(bytes)
}

/// Hashes a secret or password with Argon2id and a fresh random salt.
///
/// # Errors
///
/// Returns `AuthError::Internal` if hashing fails.
pub fn hash_secret(plain: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::internal(format!("failed to hash secret: {e}")))
}

/// Returns `true` if `value` parses as a PHC hash string.
#[must_use]
pub fn is_hashed(value: &str) -> bool {
    PasswordHash::new(value).is_ok()
}

/// Hashes `value` unless it is already a PHC hash.
///
/// # Errors
///
/// Returns `AuthError::Internal` if hashing fails.
pub fn ensure_hashed(value: &str) -> Result<String, AuthError> {
    if is_hashed(value) {
        Ok(value.to_string())
    } else {
        hash_secret(value)
    }
}

/// Verifies `plain` against a stored hash. A malformed hash never verifies.
#[must_use]
pub fn verify_secret(plain: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret_format() {
        let secret = generate_client_secret();
        assert_eq!(secret.len(), 64);
        assert!(hex::decode(&secret).is_ok());
        assert_ne!(secret, generate_client_secret());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_secret("s3cret").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret("s3cret", &hash));
        assert!(!verify_secret("other", &hash));
    }

    #[test]
    fn test_ensure_hashed_is_idempotent() {
        let once = ensure_hashed("s3cret").unwrap();
        let twice = ensure_hashed(&once).unwrap();
        assert_eq!(once, twice);
        assert!(is_hashed(&once));
        assert!(!is_hashed("s3cret"));
    }

    #[test]
    fn test_verify_malformed_hash() {
        assert!(!verify_secret("s3cret", "s3cret"));
    }
}
