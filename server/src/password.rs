//! Password hashing with Argon2id.
//!
//! Hashes are PHC strings with a random per-hash salt. The work factor is fixed
//! when the [`PasswordService`] is built. Verification never panics: an unknown
//! user, a wrong password and a corrupt stored hash all come back as
//! [`PasswordError::CredentialMismatch`] after roughly the same amount of work.
//!
//! Hashing is CPU-bound and deliberately slow, so request handlers go through
//! the `*_blocking` wrappers which run it on tokio's blocking pool.

use std::fmt;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;
use tracing::{error, warn};

use crate::config::ConfigError;

/// Plaintext used to build the hash that unknown-user logins verify against.
const DUMMY_PASSWORD: &str = "spotlight-timing-equalizer";

/// Errors from hashing or verifying a password.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    /// The password does not match, or there was nothing valid to match.
    #[error("credential mismatch")]
    CredentialMismatch,

    /// Hashing itself failed.
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// A stored password hash.
///
/// Has no `Serialize` impl and a redacted `Debug`, so it cannot leak into a
/// response body or a log line.
#[derive(Clone, PartialEq, Eq, sqlx::Type)]
#[sqlx(transparent)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Wraps a hash string loaded from storage.
    pub fn from_stored(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest(<redacted>)")
    }
}

/// Argon2id hasher with a fixed work factor.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    dummy: PasswordDigest,
}

impl PasswordService {
    /// Creates a hasher with the library's recommended Argon2id parameters.
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_params(Params::default())
    }

    /// Creates a hasher with explicit cost parameters.
    ///
    /// `memory_kib` is the memory cost in KiB, `iterations` the time cost.
    /// Tests use small values to keep the suite fast.
    pub fn with_cost(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, ConfigError> {
        let params = Params::new(memory_kib, iterations, parallelism, None).map_err(|err| {
            ConfigError::ValidationError(format!("invalid argon2 parameters: {err}"))
        })?;
        Self::with_params(params)
    }

    fn with_params(params: Params) -> Result<Self, ConfigError> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut service = Self {
            argon2,
            dummy: PasswordDigest(String::new()),
        };
        service.dummy = service.hash(DUMMY_PASSWORD).map_err(|err| {
            ConfigError::ValidationError(format!("argon2 self-test failed: {err}"))
        })?;
        Ok(service)
    }

    /// Hashes `plaintext` with a fresh random salt.
    pub fn hash(&self, plaintext: &str) -> Result<PasswordDigest, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| PasswordDigest(hash.to_string()))
            .map_err(|err| {
                error!(error = %err, "Argon2 password hashing failed");
                PasswordError::Hashing(err.to_string())
            })
    }

    /// Checks `plaintext` against `digest`.
    ///
    /// A digest that does not parse is logged and treated as a mismatch; the
    /// dummy hash is verified instead so the caller still pays full cost.
    pub fn verify(&self, plaintext: &str, digest: &PasswordDigest) -> Result<(), PasswordError> {
        let parsed = match PasswordHash::new(digest.as_str()) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "Stored password hash is corrupt");
                self.burn(plaintext);
                return Err(PasswordError::CredentialMismatch);
            }
        };

        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .map_err(|_| PasswordError::CredentialMismatch)
    }

    /// Verifies against the dummy hash and discards the result.
    ///
    /// Used when no account matched so the response time does not reveal
    /// whether the identifier exists.
    pub fn burn(&self, plaintext: &str) {
        if let Ok(parsed) = PasswordHash::new(self.dummy.as_str()) {
            let _ = self.argon2.verify_password(plaintext.as_bytes(), &parsed);
        }
    }

    /// [`hash`](Self::hash) on the blocking pool.
    pub async fn hash_blocking(&self, plaintext: String) -> Result<PasswordDigest, PasswordError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.hash(&plaintext))
            .await
            .map_err(|err| PasswordError::Hashing(format!("hashing task failed: {err}")))?
    }

    /// [`verify`](Self::verify) on the blocking pool.
    ///
    /// With `digest` set to `None` the dummy hash is verified and the result
    /// is always [`PasswordError::CredentialMismatch`].
    pub async fn verify_blocking(
        &self,
        plaintext: String,
        digest: Option<PasswordDigest>,
    ) -> Result<(), PasswordError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || match digest {
            Some(digest) => service.verify(&plaintext, &digest),
            None => {
                service.burn(&plaintext);
                Err(PasswordError::CredentialMismatch)
            }
        })
        .await
        .map_err(|err| PasswordError::Hashing(format!("verification task failed: {err}")))?
    }
}

impl fmt::Debug for PasswordService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordService")
            .field("algorithm", &"argon2id")
            .field("params", self.argon2.params())
            .finish()
    }
}
