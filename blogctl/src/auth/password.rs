//! Password hashing and verification.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::errors::Error;

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    /// Argon2id RFC recommendations
    fn default() -> Self {
        Self {
            memory_kib: 19456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Hash a password using Argon2, with the given parameters or the defaults.
pub fn hash_string_with_params(input: &str, params: Option<Argon2Params>) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = params.unwrap_or_default().to_argon2()?;

    let hash = argon2.hash_password(input.as_bytes(), &salt).map_err(|e| Error::Internal {
        operation: format!("hash password: {e}"),
    })?;

    Ok(hash.to_string())
}

pub fn hash_string(input: &str) -> Result<String, Error> {
    hash_string_with_params(input, None)
}

/// Verify a password against a stored hash.
///
/// Verification uses the parameters embedded in the hash itself.
pub fn verify_string(input: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse hash: {e}"),
    })?;

    Ok(Argon2::default().verify_password(input.as_bytes(), &parsed_hash).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Option<Argon2Params> {
        Some(Argon2Params {
            memory_kib: 128,
            iterations: 1,
            parallelism: 1,
        })
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_string_with_params("test_password_123", fast()).unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_string("test_password_123", &hash).unwrap());
        assert!(!verify_string("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_same_input_different_hashes() {
        let hash1 = hash_string_with_params("same_password", fast()).unwrap();
        let hash2 = hash_string_with_params("same_password", fast()).unwrap();

        // Salted
        assert_ne!(hash1, hash2);
        assert!(verify_string("same_password", &hash1).unwrap());
        assert!(verify_string("same_password", &hash2).unwrap());
    }

    #[test]
    fn test_default_params_hash() {
        let hash = hash_string("hunter2").unwrap();
        assert!(hash.contains("m=19456,t=2,p=1"));
    }

    #[test]
    fn test_garbage_hash_is_an_error() {
        assert!(verify_string("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_invalid_params_are_an_error() {
        let params = Argon2Params {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(hash_string_with_params("x", Some(params)).is_err());
    }
}
