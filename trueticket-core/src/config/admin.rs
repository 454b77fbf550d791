//! Admin credential check.

use argon2::{Argon2, PasswordHash, PasswordVerifier};

/// Admin configuration holding the argon2 hash of the admin secret.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    secret_hash: String,
}

impl AdminConfig {
    pub fn new(secret_hash: String) -> Self {
        Self { secret_hash }
    }

    pub fn secret_hash(&self) -> &str {
        &self.secret_hash
    }

    /// Check a plaintext secret against the stored hash. A malformed hash
    /// never verifies.
    pub fn verify(&self, plaintext: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(&self.secret_hash) else {
            tracing::error!("admin secret hash is malformed");
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::PasswordHasher;
    use argon2::password_hash::{SaltString, rand_core::OsRng};

    fn hash(secret: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_verify() {
        let admin = AdminConfig::new(hash("hunter2"));
        assert!(admin.verify("hunter2"));
        assert!(!admin.verify("hunter3"));
    }

    #[test]
    fn test_malformed_hash_rejects() {
        let admin = AdminConfig::new("not-a-hash".to_string());
        assert!(!admin.verify("not-a-hash"));
    }
}
