// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HMAC-SHA256 session tokens.
//!
//! Two issuance paths share one claim shape and one signature scheme:
//!
//! - standard login sessions, valid for [`STANDARD_TTL_SECS`]
//! - privileged sessions, valid for [`PRIVILEGED_TTL_SECS`] with
//!   `isPrivileged = true`
//!
//! The signing secret is process-wide configuration. Without it every
//! issuance and validation fails with [`TokenError::MissingSecret`].

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::claims::SessionClaims;

/// Lifetime of a standard login token.
pub const STANDARD_TTL_SECS: i64 = 60 * 60;

/// Lifetime of a privileged-session token.
pub const PRIVILEGED_TTL_SECS: i64 = 15 * 60;

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

const TRACING_TARGET: &str = "relational_admin::auth::token";

/// Token issuance and validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// No signing secret is configured.
    #[error("token signing secret is not configured")]
    MissingSecret,
    /// Token could not be decoded.
    #[error("token is malformed")]
    Malformed,
    /// Signature does not match.
    #[error("token signature is invalid")]
    InvalidSignature,
    /// Header names an algorithm other than HS256.
    #[error("token uses an unexpected signing algorithm")]
    InvalidAlgorithm,
    /// Current time is at or past `exp`.
    #[error("token has expired")]
    Expired,
    /// Signing failed.
    #[error("failed to sign token: {0}")]
    Signing(String),
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and validates signed session tokens.
#[derive(Clone)]
pub struct TokenService {
    keys: Option<Arc<SigningKeys>>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl TokenService {
    /// Build from the configured secret. `None` or an empty secret yields a
    /// service that rejects everything.
    pub fn new(secret: Option<&str>) -> Self {
        let keys = secret.filter(|s| !s.is_empty()).map(|s| {
            Arc::new(SigningKeys {
                encoding: EncodingKey::from_secret(s.as_bytes()),
                decoding: DecodingKey::from_secret(s.as_bytes()),
            })
        });
        Self { keys }
    }

    /// Whether a signing secret is available.
    pub fn is_configured(&self) -> bool {
        self.keys.is_some()
    }

    /// Issue a token for `username` valid for `ttl_secs` from now.
    pub fn issue(
        &self,
        username: &str,
        roles: Vec<String>,
        privileged: bool,
        ttl_secs: i64,
    ) -> Result<String, TokenError> {
        self.issue_at(username, roles, privileged, ttl_secs, Utc::now().timestamp())
    }

    /// Standard login token.
    pub fn issue_standard(&self, username: &str, roles: Vec<String>) -> Result<String, TokenError> {
        self.issue(username, roles, false, STANDARD_TTL_SECS)
    }

    /// Privileged-session token.
    pub fn issue_privileged(
        &self,
        username: &str,
        roles: Vec<String>,
    ) -> Result<String, TokenError> {
        self.issue(username, roles, true, PRIVILEGED_TTL_SECS)
    }

    pub(crate) fn issue_at(
        &self,
        username: &str,
        roles: Vec<String>,
        privileged: bool,
        ttl_secs: i64,
        now: i64,
    ) -> Result<String, TokenError> {
        let keys = self.keys.as_ref().ok_or(TokenError::MissingSecret)?;

        let claims = SessionClaims {
            username: username.to_string(),
            roles,
            is_privileged: privileged,
            iat: now,
            exp: now.saturating_add(ttl_secs),
        };

        encode(&Header::new(SIGNING_ALGORITHM), &claims, &keys.encoding).map_err(|e| {
            tracing::error!(target: TRACING_TARGET, error = %e, username, "failed to sign token");
            TokenError::Signing(e.to_string())
        })
    }

    /// Validate signature, algorithm and expiry, returning the claims.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.validate_at(token, Utc::now().timestamp())
    }

    pub(crate) fn validate_at(&self, token: &str, now: i64) -> Result<SessionClaims, TokenError> {
        let keys = self.keys.as_ref().ok_or(TokenError::MissingSecret)?;

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;

        let data = decode::<SessionClaims>(token, &keys.decoding, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            let mapped = match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                    TokenError::InvalidAlgorithm
                }
                _ => TokenError::Malformed,
            };
            tracing::debug!(target: TRACING_TARGET, error = %e, "token rejected");
            mapped
        })?;

        // The decoder tolerates exp == now; sessions end at exp.
        if data.claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }
}
