/// Password and reset-secret hashing
///
/// Argon2id with per-value random salts. The same scheme covers stored
/// account passwords and password-reset secrets.
use crate::error::{AuthError, AuthResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a plaintext value with a fresh random salt
pub fn hash(plain: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))?;

    Ok(hash.to_string())
}

/// Verify a plaintext value against a stored hash. Malformed hashes count
/// as a failed match rather than an error.
pub fn verify(plain: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
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
    fn test_hash_and_verify() {
        let hashed = hash("longenough1").unwrap();
        assert!(hashed.starts_with("$argon2"));
        assert!(verify("longenough1", &hashed));
        assert!(!verify("wrong-password", &hashed));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash("longenough1").unwrap();
        let b = hash("longenough1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_fails_verification() {
        assert!(!verify("anything", "not-a-phc-string"));
    }
}
