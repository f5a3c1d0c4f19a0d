// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP surface.
//!
//! | Route | Method | Guard |
//! |-------|--------|-------|
//! | `/users` | POST | none |
//! | `/login` | POST | none |
//! | `/users` | GET | token |
//! | `/users/{id}` | GET, PUT, DELETE | token |
//! | `/users/login/privileged` | POST | token |
//! | `/users/role/{id}` | GET | token, admin |
//! | `/users/role` | PUT | token, admin |
//! | `/health`, `/health/live` | GET | none |

use std::future::Future;

use axum::{
    http::{header, HeaderName},
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    sensitive_headers::SetSensitiveRequestHeadersLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::middleware::{enforce_deadline, require_admin, require_auth},
    error::ApiError,
    models::{
        AssignRolesRequest, AssignRolesResponse, CreateUserRequest, CreatedUserResponse,
        DeletedUserResponse, LoginRequest, RoleSummary, TokenResponse, UpdateUserRequest,
        UserListResponse, UserSummary, UserWithRoles,
    },
    state::AppState,
};

pub mod health;
pub mod roles;
pub mod sessions;
pub mod users;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Run `work` on its own task and wait for it.
///
/// Mutating handlers write to the store and then append an audit entry. When
/// the request deadline drops the handler future, the spawned task still runs
/// both steps to the end, so a committed change is never left unaudited.
pub(crate) async fn run_detached<T, F>(work: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work).await.map_err(|e| {
        tracing::error!(error = %e, "request task failed");
        ApiError::internal("request task failed")
    })?
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route(
            "/users",
            get(users::list_users)
                .route_layer(from_fn_with_state(state.clone(), require_auth))
                .post(users::create_user),
        )
        .route("/login", post(sessions::login))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness));

    let authenticated = Router::new()
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/login/privileged", post(sessions::privileged_session))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let admin = Router::new()
        .route("/users/role/{id}", get(roles::get_user_roles))
        .route("/users/role", put(roles::assign_roles))
        .route_layer(from_fn_with_state(state.clone(), require_admin))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(admin)
        .layer(from_fn_with_state(state.clone(), enforce_deadline))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(SetSensitiveRequestHeadersLayer::new([header::AUTHORIZATION]))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        users::create_user,
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        sessions::login,
        sessions::privileged_session,
        roles::get_user_roles,
        roles::assign_roles,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            CreateUserRequest,
            UpdateUserRequest,
            LoginRequest,
            AssignRolesRequest,
            UserSummary,
            CreatedUserResponse,
            UserListResponse,
            DeletedUserResponse,
            TokenResponse,
            RoleSummary,
            UserWithRoles,
            AssignRolesResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Users", description = "Registration and profile management"),
        (name = "Sessions", description = "Login and privileged sessions"),
        (name = "Roles", description = "Role inspection and reassignment (admin only)"),
        (name = "Health", description = "Liveness and readiness")
    )
)]
struct ApiDoc;
