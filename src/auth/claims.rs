// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session token claims and the request-scoped identity derived from them.

use serde::{Deserialize, Serialize};

/// Claims carried inside a signed session token.
///
/// The wire shape is a flat map: `username`, `roles`, `isPrivileged`, `iat`,
/// `exp`. Role names are a snapshot taken at issuance and must not be used for
/// authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Authenticated username.
    pub username: String,

    /// Role names held at issuance time.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Set on short-lived privileged sessions.
    #[serde(rename = "isPrivileged", default)]
    pub is_privileged: bool,

    /// Issued at (Unix seconds).
    pub iat: i64,

    /// Expiration (Unix seconds). The token is invalid at and after this instant.
    pub exp: i64,
}

impl SessionClaims {
    /// Whether the claims are expired at `now` (Unix seconds).
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

/// Identity established by the authentication stage.
///
/// Attached to request extensions by `require_auth` and read by the admin
/// stage and handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Username from the token.
    pub username: String,

    /// Role snapshot from the token (informational only).
    pub roles: Vec<String>,

    /// Whether the session is privileged.
    pub is_privileged: bool,
}

impl From<SessionClaims> for Identity {
    fn from(claims: SessionClaims) -> Self {
        Self {
            username: claims.username,
            roles: claims.roles,
            is_privileged: claims.is_privileged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claims() -> SessionClaims {
        SessionClaims {
            username: "alice".to_string(),
            roles: vec!["editor".to_string()],
            is_privileged: true,
            iat: 1_700_000_000,
            exp: 1_700_003_600,
        }
    }

    #[test]
    fn serializes_to_flat_map_with_camel_case_flag() {
        let value = serde_json::to_value(sample_claims()).unwrap();
        assert_eq!(value["username"], "alice");
        assert_eq!(value["roles"][0], "editor");
        assert_eq!(value["isPrivileged"], true);
        assert_eq!(value["iat"], 1_700_000_000);
        assert_eq!(value["exp"], 1_700_003_600);
        assert!(value.get("is_privileged").is_none());
    }

    #[test]
    fn expiry_is_inclusive() {
        let claims = sample_claims();
        assert!(!claims.is_expired_at(claims.exp - 1));
        assert!(claims.is_expired_at(claims.exp));
        assert!(claims.is_expired_at(claims.exp + 1));
    }

    #[test]
    fn identity_from_claims() {
        let identity = Identity::from(sample_claims());
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.roles, vec!["editor".to_string()]);
        assert!(identity.is_privileged);
    }
}
