// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role inspection and reassignment. Both routes sit behind the admin stage.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    api::run_detached,
    auth::{check_permission, Action, AdminGrants, AuthError, Resource},
    error::ApiError,
    extract::ValidJson,
    models::{AssignRolesRequest, AssignRolesResponse, RoleSummary, UserWithRoles},
    state::AppState,
    storage::UserGrants,
};

fn require(grants: &UserGrants, resource: Resource, action: Action) -> Result<(), ApiError> {
    if check_permission(grants, resource, action) {
        Ok(())
    } else {
        Err(AuthError::InsufficientPermissions.into())
    }
}

#[utoipa::path(
    get,
    path = "/users/role/{id}",
    params(("id" = u64, Path, description = "User id")),
    tag = "Roles",
    security(("bearer" = [])),
    responses(
        (status = 200, body = UserWithRoles),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_roles(
    State(state): State<AppState>,
    AdminGrants(caller): AdminGrants,
    Path(id): Path<u64>,
) -> Result<Json<UserWithRoles>, ApiError> {
    require(&caller, Resource::Role, Action::Read)?;

    let target = state
        .store
        .load_grants_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    state
        .audit
        .record(
            &caller.user.username,
            Action::Read,
            Resource::Role,
            format!("read roles of user {}", target.user.username),
        )
        .await;

    Ok(Json(UserWithRoles::from(&target)))
}

/// Replace a user's role set. `admin` can never be granted this way.
#[utoipa::path(
    put,
    path = "/users/role",
    request_body = AssignRolesRequest,
    tag = "Roles",
    security(("bearer" = [])),
    responses(
        (status = 200, body = AssignRolesResponse),
        (status = 400, description = "Validation failed or admin requested"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "User or roles not found")
    )
)]
pub async fn assign_roles(
    State(state): State<AppState>,
    AdminGrants(caller): AdminGrants,
    ValidJson(request): ValidJson<AssignRolesRequest>,
) -> Result<Json<AssignRolesResponse>, ApiError> {
    run_detached(replace_roles(state, caller, request)).await
}

async fn replace_roles(
    state: AppState,
    caller: UserGrants,
    request: AssignRolesRequest,
) -> Result<Json<AssignRolesResponse>, ApiError> {
    require(&caller, Resource::Role, Action::Update)?;

    let (user, roles) = state
        .permissions
        .assign_roles(&request.username, &request.roles)
        .await?;

    let names: Vec<&str> = roles.iter().map(|r| r.name.as_str()).collect();
    state
        .audit
        .record(
            &caller.user.username,
            Action::Update,
            Resource::Role,
            format!("set roles of {} to [{}]", user.username, names.join(", ")),
        )
        .await;

    tracing::info!(
        user_id = user.id,
        actor = %caller.user.username,
        roles = ?names,
        "roles reassigned"
    );

    Ok(Json(AssignRolesResponse {
        message: "roles updated successfully".to_string(),
        user_id: user.id,
        username: user.username,
        roles: roles.iter().map(RoleSummary::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::rbac::{ADMIN_ROLE, EDITOR_ROLE, USER_ROLE};
    use crate::state::{test_state, test_state_with_store};
    use crate::storage::audit::tests::FailingAuditStore;
    use axum::http::StatusCode;
    use std::sync::Arc;

    async fn seed(state: &AppState, username: &str, role: &str) -> u64 {
        state
            .permissions
            .create_user_with_role(username, "unused-hash", Some(role))
            .await
            .unwrap()
            .user
            .id
    }

    async fn admin_grants(state: &AppState) -> AdminGrants {
        AdminGrants(state.permissions.load_grants("root").await.unwrap())
    }

    fn assign(username: &str, roles: &[&str]) -> ValidJson<AssignRolesRequest> {
        ValidJson(AssignRolesRequest {
            username: username.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        })
    }

    #[tokio::test]
    async fn reads_roles_and_audits() {
        let state = test_state().await;
        seed(&state, "root", ADMIN_ROLE).await;
        let bob = seed(&state, "bob", EDITOR_ROLE).await;

        let Json(body) = get_user_roles(State(state.clone()), admin_grants(&state).await, Path(bob))
            .await
            .unwrap();
        assert_eq!(body.username, "bob");
        assert_eq!(body.roles, vec![EDITOR_ROLE.to_string()]);

        let audit = state.store.list_audit().await.unwrap();
        let last = audit.last().unwrap();
        assert_eq!((last.action, last.resource), (Action::Read, Resource::Role));
        assert_eq!(last.username, "root");
    }

    #[tokio::test]
    async fn unknown_user_is_404() {
        let state = test_state().await;
        seed(&state, "root", ADMIN_ROLE).await;
        let err = get_user_roles(State(state.clone()), admin_grants(&state).await, Path(404))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn assign_replaces_role_set() {
        let state = test_state().await;
        seed(&state, "root", ADMIN_ROLE).await;
        let bob = seed(&state, "bob", USER_ROLE).await;

        let Json(body) = assign_roles(
            State(state.clone()),
            admin_grants(&state).await,
            assign("bob", &[EDITOR_ROLE, "ghost"]),
        )
        .await
        .unwrap();
        assert_eq!(body.user_id, bob);
        assert_eq!(body.roles.len(), 1);
        assert_eq!(body.roles[0].name, EDITOR_ROLE);

        let grants = state.permissions.load_grants("bob").await.unwrap();
        assert_eq!(grants.role_names(), vec![EDITOR_ROLE.to_string()]);
    }

    #[tokio::test]
    async fn assign_never_grants_admin() {
        let state = test_state().await;
        seed(&state, "root", ADMIN_ROLE).await;
        seed(&state, "bob", USER_ROLE).await;

        let err = assign_roles(
            State(state.clone()),
            admin_grants(&state).await,
            assign("bob", &[EDITOR_ROLE, ADMIN_ROLE]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let grants = state.permissions.load_grants("bob").await.unwrap();
        assert_eq!(grants.role_names(), vec![USER_ROLE.to_string()]);
    }

    #[tokio::test]
    async fn assign_errors() {
        let state = test_state().await;
        seed(&state, "root", ADMIN_ROLE).await;
        seed(&state, "bob", USER_ROLE).await;

        let err = assign_roles(
            State(state.clone()),
            admin_grants(&state).await,
            assign("nobody", &[EDITOR_ROLE]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = assign_roles(
            State(state.clone()),
            admin_grants(&state).await,
            assign("bob", &["ghost"]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn audit_failure_keeps_assignment() {
        let state = test_state_with_store(Arc::new(FailingAuditStore::new())).await;
        seed(&state, "root", ADMIN_ROLE).await;
        seed(&state, "bob", USER_ROLE).await;

        let result = assign_roles(
            State(state.clone()),
            admin_grants(&state).await,
            assign("bob", &[EDITOR_ROLE]),
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(state.audit.failure_count(), 1);

        let grants = state.permissions.load_grants("bob").await.unwrap();
        assert!(grants.has_role(EDITOR_ROLE));
    }
}
