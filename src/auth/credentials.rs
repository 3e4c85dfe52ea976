//! Password hashing and one-time secret primitives.
//!
//! Passwords use Argon2id with a random salt per hash (PHC string format).
//! One-time secrets are random hex strings; they are stored as an HMAC-SHA256 keyed
//! by a server secret, so a stored value can be checked without a salt lookup.

use anyhow::{Context, Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{error, warn};

type HmacSha256 = Hmac<Sha256>;

/// Number of random bytes in a one-time secret (hex doubles the length).
pub const SECRET_BYTES: usize = 32;

#[derive(Clone)]
pub struct CredentialStore {
    params: Params,
    secret_key: SecretString,
    // Hash of a fixed password under `params`, verified when there is no real
    // hash to check so a miss costs as much as a wrong password.
    dummy_hash: Arc<OnceLock<String>>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Argon2id with m=19456 KiB, t=2, p=1.
    #[must_use]
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            params: Params::DEFAULT,
            secret_key,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    /// Override the Argon2 cost parameters.
    ///
    /// # Errors
    /// Returns an error if argon2 rejects the parameters.
    pub fn with_params(mut self, memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        self.params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
        self.dummy_hash = Arc::new(OnceLock::new());
        Ok(self)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password into a PHC string.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn hash_password(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;
        Ok(hash.to_string())
    }

    /// Returns `false` for a mismatch and for a stored hash that does not parse.
    #[must_use]
    pub fn verify_password(&self, plaintext: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Stored password hash is not a valid PHC string: {err}");
                return false;
            }
        };
        self.argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Run a full verification against a fixed hash and return `false`.
    ///
    /// Used for unknown accounts and accounts without a password, so they take as
    /// long to reject as a wrong password does.
    #[must_use]
    pub fn verify_dummy_password(&self, plaintext: &str) -> bool {
        let hash = self.dummy_hash.get_or_init(|| {
            self.hash_password("studyplanner-dummy-password")
                .unwrap_or_else(|err| {
                    error!("Failed to build dummy password hash: {err}");
                    String::new()
                })
        });
        let _ = self.verify_password(plaintext, hash);
        false
    }

    /// Whether the dummy hash has been built, which happens on first use.
    #[must_use]
    pub fn dummy_hash_ready(&self) -> bool {
        self.dummy_hash.get().is_some_and(|hash| !hash.is_empty())
    }

    /// Hex-encoded HMAC-SHA256 of `secret`.
    ///
    /// # Errors
    /// Returns an error if the HMAC key is rejected.
    pub fn hash_secret(&self, secret: &str) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(secret.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time comparison of `secret` against a stored [`hash_secret`] value.
    ///
    /// [`hash_secret`]: CredentialStore::hash_secret
    #[must_use]
    pub fn verify_secret(&self, secret: &str, hash: &str) -> bool {
        let Ok(expected) = hex::decode(hash) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(secret.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.secret_key.expose_secret().as_bytes())
            .map_err(|err| anyhow!("invalid hmac key: {err}"))
    }
}

/// Generate `length` random bytes from the OS RNG, hex encoded.
///
/// # Errors
/// Returns an error if the OS RNG fails.
pub fn generate_secret(length: usize) -> Result<String> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate secret")?;
    Ok(hex::encode(bytes))
}
