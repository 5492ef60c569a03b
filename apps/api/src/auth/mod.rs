//! Credential handling: Argon2id password hashing and JWT issuance.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};

pub mod middleware;
pub mod token;

/// Hashes a password with Argon2id, returning the PHC-format string
/// stored in `users.hashed_password`.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

/// Verifies a password against a stored PHC-format hash.
/// Returns false for wrong passwords; errors only on malformed hashes.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow!("Invalid password hash format: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("hunter42").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter42", &hash).unwrap());
    }

    #[test]
    fn test_wrong_password_rejected() {
        let hash = hash_password("hunter42").unwrap();
        assert!(!verify_password("hunter43", &hash).unwrap());
    }

    #[test]
    fn test_same_password_different_salts() {
        let a = hash_password("hunter42").unwrap();
        let b = hash_password("hunter42").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(verify_password("hunter42", "not-a-phc-string").is_err());
    }
}
