//! One-time codes confirming a pending transfer.
//!
//! A code is a uniformly random six digit number. Only an Argon2id PHC string of its decimal
//! form is persisted; the PHC string carries the per-call salt and the (fixed) cost
//! parameters, so verification needs nothing but the stored hash.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;

pub const OTP_MIN: u32 = 100_000;
pub const OTP_MAX: u32 = 999_999;
pub const OTP_TTL_MINUTES: i64 = 5;

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("failed to hash one-time code: {0}")]
    Hash(String),
}

/// Plaintext code plus what gets persisted. The plaintext only travels to the outbox.
#[derive(Clone)]
pub struct GeneratedOtp {
    pub code: u32,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for GeneratedOtp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedOtp")
            .field("code", &"******")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct OtpGenerator {
    hasher: Argon2<'static>,
}

impl OtpGenerator {
    pub fn new() -> Self {
        Self {
            hasher: Argon2::default(),
        }
    }

    pub fn ttl() -> Duration {
        Duration::minutes(OTP_TTL_MINUTES)
    }

    pub fn generate(&self) -> Result<GeneratedOtp, OtpError> {
        self.generate_at(Utc::now())
    }

    pub fn generate_at(&self, now: DateTime<Utc>) -> Result<GeneratedOtp, OtpError> {
        let code = rand::thread_rng().gen_range(OTP_MIN..=OTP_MAX);
        let hash = self.hash(&code.to_string())?;

        Ok(GeneratedOtp {
            code,
            hash,
            expires_at: now + Self::ttl(),
        })
    }

    fn hash(&self, code: &str) -> Result<String, OtpError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher
            .hash_password(code.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| OtpError::Hash(e.to_string()))
    }

    /// Re-hashes `candidate` with the salt and parameters embedded in `stored_hash`. The
    /// output comparison is constant time. Malformed hashes never verify.
    pub fn verify(&self, candidate: &str, stored_hash: &str) -> bool {
        let parsed = match PasswordHash::new(stored_hash) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };

        self.hasher
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    }
}
