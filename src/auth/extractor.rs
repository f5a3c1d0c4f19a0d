// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated requests.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(identity): Auth) -> impl IntoResponse {
//!     // identity.username is the authenticated user
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::middleware::{authenticate, authorize_admin};
use super::{AuthError, Identity};
use crate::state::AppState;
use crate::storage::UserGrants;

/// Identity established by stage 1.
///
/// Reads the identity attached by `require_auth`; on routes without that
/// layer it validates the bearer token itself.
pub struct Auth(pub Identity);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>().cloned() {
            return Ok(Auth(identity));
        }

        let identity = authenticate(&parts.headers, &state.tokens)?;
        parts.extensions.insert(identity.clone());
        Ok(Auth(identity))
    }
}

/// Current grants of an admin caller, loaded by stage 2.
///
/// Falls back to running both stages when `require_admin` did not.
pub struct AdminGrants(pub UserGrants);

impl FromRequestParts<AppState> for AdminGrants {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(grants) = parts.extensions.get::<UserGrants>().cloned() {
            return Ok(AdminGrants(grants));
        }

        let Auth(identity) = Auth::from_request_parts(parts, state).await?;
        let grants = authorize_admin(state.store.as_ref(), &identity).await?;
        Ok(AdminGrants(grants))
    }
}
