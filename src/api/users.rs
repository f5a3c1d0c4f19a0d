// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User registration and profile endpoints.
//!
//! Mutations check the caller's current permissions (loaded from the store,
//! never from the token) and append an audit entry on success.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    api::run_detached,
    auth::{Action, Auth, Identity, Resource},
    error::ApiError,
    extract::ValidJson,
    models::{
        CreateUserRequest, CreatedUserResponse, DeletedUserResponse, UpdateUserRequest,
        UserListResponse, UserSummary,
    },
    state::AppState,
    storage::UserChanges,
};

#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    tag = "Users",
    responses(
        (status = 201, body = CreatedUserResponse),
        (status = 400, description = "Validation failed, duplicate username or second admin")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreatedUserResponse>), ApiError> {
    run_detached(create(state, request)).await
}

async fn create(
    state: AppState,
    request: CreateUserRequest,
) -> Result<(StatusCode, Json<CreatedUserResponse>), ApiError> {
    let hash = state.passwords.hash_password_async(request.password).await?;
    let created = state
        .permissions
        .create_user_with_role(&request.username, &hash, request.role.as_deref())
        .await?;

    state
        .audit
        .record(
            &created.user.username,
            Action::Create,
            Resource::Users,
            format!(
                "created new user {} with role {}",
                created.user.username, created.role
            ),
        )
        .await;

    tracing::info!(user_id = created.user.id, role = %created.role, "user created");

    Ok((
        StatusCode::CREATED,
        Json(CreatedUserResponse {
            user: UserSummary::from(&created.user),
            role: created.role,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    security(("bearer" = [])),
    responses((status = 200, body = UserListResponse))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Auth(_identity): Auth,
) -> Result<Json<UserListResponse>, ApiError> {
    let users = state.store.list_users().await?;
    Ok(Json(UserListResponse {
        users: users.iter().map(UserSummary::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = u64, Path, description = "User id")),
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, body = UserSummary),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Auth(_identity): Auth,
    Path(id): Path<u64>,
) -> Result<Json<UserSummary>, ApiError> {
    let user = state
        .store
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(UserSummary::from(&user)))
}

/// Update the caller's own username and/or password.
#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = u64, Path, description = "User id; must be the caller")),
    request_body = UpdateUserRequest,
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, body = UserSummary),
        (status = 400, description = "Id mismatch, validation failed or nothing to update"),
        (status = 403, description = "Missing Update users permission")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Auth(identity): Auth,
    Path(id): Path<u64>,
    ValidJson(request): ValidJson<UpdateUserRequest>,
) -> Result<Json<UserSummary>, ApiError> {
    run_detached(update(state, identity, id, request)).await
}

async fn update(
    state: AppState,
    identity: Identity,
    id: u64,
    request: UpdateUserRequest,
) -> Result<Json<UserSummary>, ApiError> {
    let caller = state.permissions.load_grants(&identity.username).await?;
    if caller.user.id != id {
        return Err(ApiError::bad_request("username & userid mismatch"));
    }
    state
        .permissions
        .require_permission(&identity.username, Resource::Users, Action::Update)
        .await?;

    if request.username.is_none() && request.password.is_none() {
        return Err(ApiError::bad_request("no fields to update"));
    }

    let password_hash = match request.password {
        Some(password) => Some(state.passwords.hash_password_async(password).await?),
        None => None,
    };
    let changes = UserChanges {
        username: request.username,
        password_hash,
    };
    let user = state.store.update_user(id, changes).await?;

    state
        .audit
        .record(
            &identity.username,
            Action::Update,
            Resource::Users,
            format!("updated user details for user id {id}"),
        )
        .await;

    Ok(Json(UserSummary::from(&user)))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = u64, Path, description = "User id")),
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, body = DeletedUserResponse),
        (status = 403, description = "Missing Delete users permission"),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Auth(identity): Auth,
    Path(id): Path<u64>,
) -> Result<Json<DeletedUserResponse>, ApiError> {
    run_detached(delete(state, identity, id)).await
}

async fn delete(
    state: AppState,
    identity: Identity,
    id: u64,
) -> Result<Json<DeletedUserResponse>, ApiError> {
    state
        .permissions
        .require_permission(&identity.username, Resource::Users, Action::Delete)
        .await?;

    let deleted = state.store.delete_user(id).await?;

    state
        .audit
        .record(
            &identity.username,
            Action::Delete,
            Resource::Users,
            format!("deleted user {} (id {id})", deleted.username),
        )
        .await;

    tracing::info!(user_id = id, actor = %identity.username, "user deleted");

    Ok(Json(DeletedUserResponse {
        message: "user deleted successfully".to_string(),
        user: UserSummary::from(&deleted),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{rbac::EDITOR_ROLE, Identity};
    use crate::state::{test_state, test_state_with_store};
    use crate::storage::audit::tests::FailingAuditStore;
    use std::sync::Arc;

    fn identity(username: &str) -> Auth {
        Auth(Identity {
            username: username.to_string(),
            roles: vec![],
            is_privileged: false,
        })
    }

    async fn register(state: &AppState, username: &str, role: Option<&str>) -> u64 {
        let (_, Json(created)) = create_user(
            State(state.clone()),
            ValidJson(CreateUserRequest {
                username: username.to_string(),
                password: "password1".to_string(),
                role: role.map(str::to_string),
            }),
        )
        .await
        .unwrap();
        created.user.id
    }

    #[tokio::test]
    async fn create_user_hashes_and_audits() {
        let state = test_state().await;
        let (status, Json(created)) = create_user(
            State(state.clone()),
            ValidJson(CreateUserRequest {
                username: "alice".to_string(),
                password: "password1".to_string(),
                role: Some("nonexistent".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.role, "user");

        let stored = state.store.find_user_by_username("alice").await.unwrap().unwrap();
        assert!(stored.password_hash.starts_with("$argon2id$v=19$"));
        assert!(state
            .passwords
            .verify_password(&stored.password_hash, "password1")
            .unwrap());

        let audit = state.store.list_audit().await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].username, "alice");
        assert_eq!(audit[0].action, Action::Create);
        assert_eq!(audit[0].resource, Resource::Users);
    }

    #[tokio::test]
    async fn second_admin_is_bad_request() {
        let state = test_state().await;
        register(&state, "root", Some("admin")).await;
        let err = create_user(
            State(state.clone()),
            ValidJson(CreateUserRequest {
                username: "root2".to_string(),
                password: "password1".to_string(),
                role: Some("admin".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, Some("conflict"));
        assert_eq!(state.store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn audit_failure_does_not_fail_creation() {
        let state = test_state_with_store(Arc::new(FailingAuditStore::new())).await;
        let (status, _) = create_user(
            State(state.clone()),
            ValidJson(CreateUserRequest {
                username: "alice".to_string(),
                password: "password1".to_string(),
                role: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(state.store.find_user_by_username("alice").await.unwrap().is_some());
        assert_eq!(state.audit.failure_count(), 1);
    }

    #[tokio::test]
    async fn list_and_get_hide_hashes() {
        let state = test_state().await;
        let id = register(&state, "alice", None).await;

        let Json(list) = list_users(State(state.clone()), identity("alice")).await.unwrap();
        assert_eq!(list.users.len(), 1);
        let json = serde_json::to_string(&list).unwrap();
        assert!(!json.contains("argon2"));

        let Json(one) = get_user(State(state.clone()), identity("alice"), Path(id))
            .await
            .unwrap();
        assert_eq!(one.username, "alice");

        let err = get_user(State(state), identity("alice"), Path(999))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_requires_matching_id() {
        let state = test_state().await;
        register(&state, "root", Some("admin")).await;
        let other = register(&state, "bob", None).await;

        let err = update_user(
            State(state),
            identity("root"),
            Path(other),
            ValidJson(UpdateUserRequest {
                username: Some("hijacked".to_string()),
                password: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_requires_permission() {
        let state = test_state().await;
        let id = register(&state, "bob", None).await;

        let err = update_user(
            State(state),
            identity("bob"),
            Path(id),
            ValidJson(UpdateUserRequest {
                username: Some("robert".to_string()),
                password: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_updates_own_profile() {
        let state = test_state().await;
        let id = register(&state, "root", Some("admin")).await;

        let err = update_user(
            State(state.clone()),
            identity("root"),
            Path(id),
            ValidJson(UpdateUserRequest::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let Json(updated) = update_user(
            State(state.clone()),
            identity("root"),
            Path(id),
            ValidJson(UpdateUserRequest {
                username: None,
                password: Some("new-password".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.username, "root");

        let stored = state.store.find_user_by_id(id).await.unwrap().unwrap();
        assert!(state
            .passwords
            .verify_password(&stored.password_hash, "new-password")
            .unwrap());

        let audit = state.store.list_audit().await.unwrap();
        let last = audit.last().unwrap();
        assert_eq!((last.action, last.resource), (Action::Update, Resource::Users));
        assert_eq!(last.username, "root");
    }

    #[tokio::test]
    async fn editor_deletes_user() {
        let state = test_state().await;
        register(&state, "ed", Some(EDITOR_ROLE)).await;
        let victim = register(&state, "bob", None).await;

        let Json(body) = delete_user(State(state.clone()), identity("ed"), Path(victim))
            .await
            .unwrap();
        assert_eq!(body.user.username, "bob");
        assert!(state.store.find_user_by_id(victim).await.unwrap().is_none());

        let err = delete_user(State(state.clone()), identity("ed"), Path(victim))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let audit = state.store.list_audit().await.unwrap();
        assert!(audit
            .iter()
            .any(|e| e.action == Action::Delete && e.username == "ed"));
    }

    #[tokio::test]
    async fn plain_user_cannot_delete() {
        let state = test_state().await;
        register(&state, "bob", None).await;
        let victim = register(&state, "carol", None).await;

        let err = delete_user(State(state.clone()), identity("bob"), Path(victim))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(state.store.find_user_by_id(victim).await.unwrap().is_some());
    }
}
