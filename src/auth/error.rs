// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::{password::PasswordError, token::TokenError};
use crate::storage::StoreError;

/// Outcome kinds of the authentication / authorization core.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed encoded hash or other unparseable input.
    #[error("Malformed input: {0}")]
    Format(String),
    /// Unknown user or wrong password. Deliberately indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// Bad signature, wrong algorithm, expired or unsigned token.
    #[error("Invalid token: {0}")]
    Token(#[from] TokenError),
    /// No bearer credential on the request.
    #[error("Authorization header is required")]
    MissingAuthHeader,
    /// Authorization header present but unusable.
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,
    /// Authenticated but lacking the required role or permission.
    #[error("Insufficient permissions for this operation")]
    InsufficientPermissions,
    /// Second admin, admin via reassignment, or duplicate username.
    #[error("{0}")]
    Conflict(String),
    /// A name that must resolve did not.
    #[error("{0}")]
    NotFound(String),
    /// Store or runtime failure.
    #[error("Internal authentication error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Format(_) => "malformed_input",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::Token(TokenError::Expired) => "token_expired",
            AuthError::Token(TokenError::InvalidSignature) => "invalid_signature",
            AuthError::Token(TokenError::InvalidAlgorithm) => "invalid_algorithm",
            AuthError::Token(_) => "invalid_token",
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::InsufficientPermissions => "insufficient_permissions",
            AuthError::Conflict(_) => "conflict",
            AuthError::NotFound(_) => "not_found",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::Token(_)
            | AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AuthError::Format(_) | AuthError::Conflict(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists(what) => AuthError::Conflict(format!("{what} already exists")),
            StoreError::NotFound(what) => AuthError::NotFound(format!("{what} not found")),
            StoreError::RoleHeld(role) => AuthError::Conflict(format!("role {role} is already held")),
            other => {
                tracing::error!(error = %other, "store operation failed");
                AuthError::Internal("storage unavailable".to_string())
            }
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(e: PasswordError) -> Self {
        match e {
            PasswordError::Format(msg) => AuthError::Format(msg),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
