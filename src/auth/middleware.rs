// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization middleware for Axum.
//!
//! Two strictly ordered stages gate protected routes:
//!
//! 1. [`require_auth`] validates the bearer token and attaches an
//!    [`Identity`] to the request extensions.
//! 2. [`require_admin`] reads that identity, reloads the user's current roles
//!    from the store and requires the `admin` role. The loaded
//!    [`UserGrants`] are attached for handlers.
//!
//! Stage 2 never runs without stage 1: with no identity attached it rejects
//! with 401 instead of looking anything up.
//!
//! ```rust,ignore
//! let admin = Router::new()
//!     .route("/users/role", put(assign_roles))
//!     .route_layer(from_fn_with_state(state.clone(), require_admin))
//!     .route_layer(from_fn_with_state(state.clone(), require_auth));
//! ```
//!
//! Layers added later run first, so `require_auth` must be the outer one.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{rbac::ADMIN_ROLE, AuthError, Identity, TokenService};
use crate::error::ApiError;
use crate::state::AppState;
use crate::storage::{AuthStore, UserGrants};

/// Extract the bearer credential.
///
/// Accepts `Bearer <token>` and, for clients that send the raw token, a bare
/// token with no scheme.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?
        .trim();

    let token = match value.split_once(' ') {
        Some(("Bearer", rest)) => rest.trim(),
        Some(_) => return Err(AuthError::InvalidAuthHeader),
        None if value == "Bearer" => "",
        None => value,
    };

    if token.is_empty() {
        return Err(AuthError::MissingAuthHeader);
    }
    Ok(token)
}

/// Stage 1 without the request plumbing.
pub fn authenticate(headers: &HeaderMap, tokens: &TokenService) -> Result<Identity, AuthError> {
    let token = bearer_token(headers)?;
    let claims = tokens.validate(token)?;
    Ok(Identity::from(claims))
}

/// Stage 2 without the request plumbing.
///
/// A user that no longer exists is treated as unauthenticated.
pub async fn authorize_admin(
    store: &dyn AuthStore,
    identity: &Identity,
) -> Result<UserGrants, AuthError> {
    let grants = store
        .load_grants_by_username(&identity.username)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !grants.has_role(ADMIN_ROLE) {
        tracing::warn!(
            username = %identity.username,
            roles = ?grants.role_names(),
            "admin route denied"
        );
        return Err(AuthError::InsufficientPermissions);
    }
    Ok(grants)
}

/// Stage 1: authenticate the bearer token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(request.headers(), &state.tokens) {
        Ok(identity) => {
            tracing::debug!(
                username = %identity.username,
                roles = ?identity.roles,
                privileged = identity.is_privileged,
                "request authenticated"
            );
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, path = %request.uri().path(), "authentication rejected");
            e.into_response()
        }
    }
}

/// Stage 2: require the `admin` role on the freshly loaded user.
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(identity) = request.extensions().get::<Identity>().cloned() else {
        tracing::error!(path = %request.uri().path(), "admin stage reached without identity");
        return AuthError::MissingAuthHeader.into_response();
    };

    match authorize_admin(state.store.as_ref(), &identity).await {
        Ok(grants) => {
            request.extensions_mut().insert(grants);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Bound the whole request, including store calls and hashing, by the
/// configured timeout.
///
/// Hashing already in flight on the blocking pool finishes on its own; only
/// the response is cut short. Mutating handlers run through
/// [`run_detached`](crate::api::run_detached), so a cut response never
/// separates a store write from its audit entry.
pub async fn enforce_deadline(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match tokio::time::timeout(state.request_timeout, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(
                path = %path,
                timeout_ms = state.request_timeout.as_millis() as u64,
                "request deadline exceeded"
            );
            ApiError::new(StatusCode::REQUEST_TIMEOUT, "Request deadline exceeded").into_response()
        }
    }
}
