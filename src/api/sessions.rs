// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{
    auth::{
        token::{PRIVILEGED_TTL_SECS, STANDARD_TTL_SECS},
        Auth, AuthError, PasswordError, TokenError,
    },
    error::ApiError,
    extract::ValidJson,
    models::{LoginRequest, TokenResponse},
    state::AppState,
};

fn issuance_failed(e: TokenError) -> ApiError {
    tracing::error!(error = %e, "could not generate token");
    AuthError::Internal("could not generate token".to_string()).into()
}

/// Exchange username and password for a standard session token.
///
/// Unknown usernames still pay for one key derivation, and both failure
/// paths return the same 401 body.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    tag = "Sessions",
    responses(
        (status = 200, body = TokenResponse),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Some(user) = state.store.find_user_by_username(&request.username).await? else {
        state.passwords.verify_dummy_async(request.password).await;
        tracing::info!(username = %request.username, "login failed");
        return Err(AuthError::InvalidCredentials.into());
    };

    let verified = match state
        .passwords
        .verify_password_async(user.password_hash.clone(), request.password)
        .await
    {
        Ok(verified) => verified,
        Err(PasswordError::Format(reason)) => {
            tracing::error!(user_id = user.id, %reason, "stored password hash is malformed");
            false
        }
        Err(e) => return Err(e.into()),
    };
    if !verified {
        tracing::info!(username = %request.username, "login failed");
        return Err(AuthError::InvalidCredentials.into());
    }

    let roles = state
        .store
        .load_grants_by_id(user.id)
        .await?
        .map(|grants| grants.role_names())
        .unwrap_or_default();

    let token = state
        .tokens
        .issue_standard(&user.username, roles)
        .map_err(issuance_failed)?;

    tracing::info!(user_id = user.id, "login succeeded");

    Ok(Json(TokenResponse {
        message: "login success".to_string(),
        jwt_token: token,
        expires_in: STANDARD_TTL_SECS,
        is_privileged: false,
    }))
}

/// Upgrade an authenticated session to a short-lived privileged one.
#[utoipa::path(
    post,
    path = "/users/login/privileged",
    tag = "Sessions",
    security(("bearer" = [])),
    responses(
        (status = 200, body = TokenResponse),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn privileged_session(
    State(state): State<AppState>,
    Auth(identity): Auth,
) -> Result<Json<TokenResponse>, ApiError> {
    let grants = state
        .store
        .load_grants_by_username(&identity.username)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    let token = state
        .tokens
        .issue_privileged(&grants.user.username, grants.role_names())
        .map_err(issuance_failed)?;

    tracing::info!(user_id = grants.user.id, "privileged session issued");

    Ok(Json(TokenResponse {
        message: "session creation success".to_string(),
        jwt_token: token,
        expires_in: PRIVILEGED_TTL_SECS,
        is_privileged: true,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::users::create_user;
    use crate::auth::Identity;
    use crate::models::CreateUserRequest;
    use crate::state::test_state;
    use axum::http::StatusCode;

    async fn register(state: &AppState, username: &str, password: &str, role: Option<&str>) {
        create_user(
            State(state.clone()),
            ValidJson(CreateUserRequest {
                username: username.to_string(),
                password: password.to_string(),
                role: role.map(str::to_string),
            }),
        )
        .await
        .unwrap();
    }

    fn login_request(username: &str, password: &str) -> ValidJson<LoginRequest> {
        ValidJson(LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
            role: None,
        })
    }

    #[tokio::test]
    async fn login_issues_standard_token() {
        let state = test_state().await;
        register(&state, "alice", "correct horse", Some("editor")).await;

        let Json(body) = login(State(state.clone()), login_request("alice", "correct horse"))
            .await
            .unwrap();
        assert_eq!(body.expires_in, 3600);
        assert!(!body.is_privileged);

        let claims = state.tokens.validate(&body.jwt_token).unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.roles, vec!["editor".to_string()]);
        assert!(!claims.is_privileged);
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_look_the_same() {
        let state = test_state().await;
        register(&state, "alice", "correct horse", None).await;

        let wrong = login(State(state.clone()), login_request("alice", "battery staple"))
            .await
            .unwrap_err();
        let unknown = login(State(state.clone()), login_request("mallory", "battery staple"))
            .await
            .unwrap_err();

        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.status, unknown.status);
        assert_eq!(wrong.message, unknown.message);
        assert_eq!(wrong.code, unknown.code);
    }

    #[tokio::test]
    async fn login_role_field_is_ignored() {
        let state = test_state().await;
        register(&state, "bob", "hunter22", None).await;

        let Json(body) = login(
            State(state.clone()),
            ValidJson(LoginRequest {
                username: "bob".to_string(),
                password: "hunter22".to_string(),
                role: Some("admin".to_string()),
            }),
        )
        .await
        .unwrap();
        let claims = state.tokens.validate(&body.jwt_token).unwrap();
        assert_eq!(claims.roles, vec!["user".to_string()]);
    }

    #[tokio::test]
    async fn login_without_secret_is_internal_error() {
        let configured = test_state().await;
        register(&configured, "bob", "hunter22", None).await;
        let mut state = configured.clone();
        state.tokens = crate::auth::TokenService::new(None);

        let err = login(State(state), login_request("bob", "hunter22"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn privileged_session_is_short_lived() {
        let state = test_state().await;
        register(&state, "root", "rootpass", Some("admin")).await;
        let identity = Identity {
            username: "root".to_string(),
            roles: vec![],
            is_privileged: false,
        };

        let Json(body) = privileged_session(State(state.clone()), Auth(identity))
            .await
            .unwrap();
        assert_eq!(body.expires_in, 900);

        let claims = state.tokens.validate(&body.jwt_token).unwrap();
        assert!(claims.is_privileged);
        assert_eq!(claims.exp - claims.iat, 900);
        assert_eq!(claims.roles, vec!["admin".to_string()]);
    }

    #[tokio::test]
    async fn privileged_session_for_deleted_user_is_401() {
        let state = test_state().await;
        let identity = Identity {
            username: "ghost".to_string(),
            roles: vec![],
            is_privileged: false,
        };
        let err = privileged_session(State(state), Auth(identity))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
