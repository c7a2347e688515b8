//! Credential primitives: password hashing and session tokens.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::config::Argon2 as ArgonConfig;

const TOKEN_BYTES: usize = 32;

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors related to cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("argon2 failed: {0}")]
    Argon2(String),
}

/// Cryptographic manager.
pub struct Crypto {
    pub pwd: PasswordManager,
}

impl Crypto {
    /// Create a new [`Crypto`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        Ok(Self {
            pwd: PasswordManager::new(config)?,
        })
    }

    /// Generate an opaque session token.
    pub fn session_token(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
pub struct PasswordManager {
    params: Params,
    /// Hash of a random secret, verified against when no account matches
    /// so that unknown logins cost as much as wrong passwords.
    decoy: String,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        let mut manager = Self {
            params,
            decoy: String::default(),
        };
        let mut secret = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut secret);
        manager.decoy = manager.hash_password(secret)?;

        Ok(manager)
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> bool {
        match PasswordHash::new(phc_hash) {
            Ok(parsed) => self
                .argon2()
                .verify_password(password.as_ref(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Burn a verification against the decoy hash. Always `false`.
    pub fn verify_decoy(&self, password: impl AsRef<[u8]>) -> bool {
        let _ = self.verify_password(password, &self.decoy);
        false
    }
}

#[cfg(test)]
pub(crate) fn cheap() -> ArgonConfig {
    ArgonConfig {
        memory_cost: 64,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    }
}
