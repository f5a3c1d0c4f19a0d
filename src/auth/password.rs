// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Argon2id password hashing.
//!
//! Hashes are stored as self-describing strings:
//!
//! ```text
//! $argon2id$v=19$m=<mem_kib>,t=<iterations>,p=<parallelism>$<salt>$<hash>
//! ```
//!
//! Salt and hash are standard base64 without padding. Verification always uses
//! the cost parameters embedded in the stored string, so hashes produced under
//! older settings keep verifying after the defaults change. Embedded costs are
//! bounded before any work is done, so a corrupted row cannot exhaust memory.

use argon2::password_hash::{Error as HashError, PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher as _, PasswordVerifier, Version};
use rand::{rngs::OsRng, RngCore};

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Stored hashes may use at most this multiple of the current memory cost.
pub const MAX_MEMORY_FACTOR: u32 = 4;

/// Upper bound on the iteration count accepted from a stored hash.
pub const MAX_ITERATIONS: u32 = 16;

/// Upper bound on the lane count accepted from a stored hash.
pub const MAX_PARALLELISM: u32 = 64;

const TRACING_TARGET: &str = "relational_admin::auth::password";

/// Errors raised while hashing or verifying passwords.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// The encoded hash does not follow the expected layout.
    #[error("invalid password hash format: {0}")]
    Format(String),
    /// The operating system could not provide random bytes for the salt.
    #[error("failed to gather salt entropy: {0}")]
    Entropy(String),
    /// Cost parameters rejected by the KDF.
    #[error("invalid argon2 parameters: {0}")]
    Params(String),
    /// The blocking hashing task could not complete.
    #[error("password hashing task failed: {0}")]
    Task(String),
}

/// Cost parameters for new hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in kibibytes.
    pub memory_kib: u32,
    /// Number of passes over memory.
    pub iterations: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
    /// Derived key length in bytes.
    pub key_len: usize,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 1,
            parallelism: 4,
            key_len: 32,
        }
    }
}

impl HashParams {
    fn to_argon2(self) -> Result<Params, argon2::Error> {
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(self.key_len),
        )
    }
}

/// Encodes and verifies Argon2id password hashes.
///
/// Cloning is cheap; the codec holds only its cost parameters and is safe to
/// share between request tasks.
#[derive(Debug, Clone)]
pub struct PasswordCodec {
    params: HashParams,
}

impl Default for PasswordCodec {
    fn default() -> Self {
        Self {
            params: HashParams::default(),
        }
    }
}

impl PasswordCodec {
    /// Create a codec, rejecting parameter sets Argon2 cannot run with.
    pub fn new(params: HashParams) -> Result<Self, PasswordError> {
        params
            .to_argon2()
            .map_err(|e| PasswordError::Params(e.to_string()))?;
        Ok(Self { params })
    }

    /// Cost parameters used for new hashes.
    pub fn params(&self) -> HashParams {
        self.params
    }

    fn argon2(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = self
            .params
            .to_argon2()
            .map_err(|e| PasswordError::Params(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a plaintext password with a fresh random salt.
    pub fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        let mut bytes = [0u8; SALT_LEN];
        OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
            tracing::error!(target: TRACING_TARGET, error = %e, "salt generation failed");
            PasswordError::Entropy(e.to_string())
        })?;
        let salt = SaltString::encode_b64(&bytes).map_err(|e| PasswordError::Entropy(e.to_string()))?;

        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!(target: TRACING_TARGET, error = %e, "password hashing failed");
                PasswordError::Params(e.to_string())
            })?;

        Ok(hash.to_string())
    }

    /// Verify a plaintext password against an encoded hash.
    ///
    /// Returns `Ok(false)` on mismatch. Errors are reserved for hashes that
    /// cannot be parsed or carry costs outside the accepted bounds.
    pub fn verify_password(&self, encoded: &str, password: &str) -> Result<bool, PasswordError> {
        let segments = encoded.split('$').count();
        if segments != 6 {
            return Err(PasswordError::Format(format!(
                "expected 6 '$'-delimited segments, found {segments}"
            )));
        }

        let parsed = PasswordHash::new(encoded).map_err(format_error)?;
        if parsed.algorithm != argon2::ARGON2ID_IDENT {
            return Err(PasswordError::Format(format!(
                "unsupported algorithm '{}'",
                parsed.algorithm
            )));
        }
        if parsed.version != Some(Version::V0x13 as u32) {
            return Err(PasswordError::Format("unsupported version".to_string()));
        }
        self.check_costs(&parsed)?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(HashError::Password) => Ok(false),
            Err(e) => Err(format_error(e)),
        }
    }

    /// Reject stored costs that are missing or far above what this service
    /// would ever produce.
    fn check_costs(&self, parsed: &PasswordHash<'_>) -> Result<(), PasswordError> {
        let cost = |name: &str| {
            parsed
                .params
                .get_decimal(name)
                .ok_or_else(|| PasswordError::Format(format!("missing cost parameter '{name}'")))
        };
        let (memory, iterations, lanes) = (cost("m")?, cost("t")?, cost("p")?);

        let memory_ceiling = self
            .params
            .memory_kib
            .max(HashParams::default().memory_kib)
            .saturating_mul(MAX_MEMORY_FACTOR);
        let iteration_ceiling = MAX_ITERATIONS.max(self.params.iterations);
        let lane_ceiling = MAX_PARALLELISM.max(self.params.parallelism);

        if memory > memory_ceiling || iterations > iteration_ceiling || lanes > lane_ceiling {
            tracing::warn!(
                target: TRACING_TARGET,
                memory,
                iterations,
                lanes,
                "stored hash exceeds cost bounds"
            );
            return Err(PasswordError::Format(format!(
                "cost m={memory},t={iterations},p={lanes} exceeds bounds"
            )));
        }
        Ok(())
    }

    /// Burn one key derivation with the current parameters and report failure.
    ///
    /// Used on login for unknown usernames so the response takes as long as a
    /// real verification.
    pub fn verify_dummy(&self, password: &str) -> bool {
        let salt = [0u8; SALT_LEN];
        let mut out = vec![0u8; self.params.key_len];
        if let Ok(argon2) = self.argon2() {
            let _ = argon2.hash_password_into(password.as_bytes(), &salt, &mut out);
        }
        false
    }

    /// [`hash_password`](Self::hash_password) on the blocking thread pool.
    pub async fn hash_password_async(&self, password: String) -> Result<String, PasswordError> {
        let codec = self.clone();
        tokio::task::spawn_blocking(move || codec.hash_password(&password))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    /// [`verify_password`](Self::verify_password) on the blocking thread pool.
    pub async fn verify_password_async(
        &self,
        encoded: String,
        password: String,
    ) -> Result<bool, PasswordError> {
        let codec = self.clone();
        tokio::task::spawn_blocking(move || codec.verify_password(&encoded, &password))
            .await
            .map_err(|e| PasswordError::Task(e.to_string()))?
    }

    /// [`verify_dummy`](Self::verify_dummy) on the blocking thread pool.
    pub async fn verify_dummy_async(&self, password: String) -> bool {
        let codec = self.clone();
        tokio::task::spawn_blocking(move || codec.verify_dummy(&password))
            .await
            .unwrap_or(false)
    }
}

fn format_error(e: HashError) -> PasswordError {
    PasswordError::Format(e.to_string())
}

#[cfg(test)]
pub(crate) fn cheap_codec() -> PasswordCodec {
    PasswordCodec::new(HashParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
        key_len: 32,
    })
    .expect("cheap params are valid")
}
