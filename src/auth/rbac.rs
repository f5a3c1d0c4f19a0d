// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role-based access control.
//!
//! ## Catalog
//!
//! Permissions are `(action, resource)` pairs from a closed set:
//! actions `Create | Read | Update | Delete` over resources `users | role`.
//!
//! ## Seeded Roles
//!
//! | Role | Permissions |
//! |------|-------------|
//! | `admin` | Read/Update/Delete users, Read/Update role |
//! | `editor` | Read/Delete users |
//! | `user` | Read users |
//!
//! Checks are exact matches against the union of a user's role permissions.
//! There is no hierarchy and no wildcard.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AuthError;
use crate::storage::{
    AuthStore, NewUser, PermissionId, PermissionRecord, RoleRecord, StoreError, UserGrants,
    UserRecord,
};

/// The administrative role. At most one user may hold it.
pub const ADMIN_ROLE: &str = "admin";
/// Seeded editor role.
pub const EDITOR_ROLE: &str = "editor";
/// Seeded default role; fallback for unknown requested roles.
pub const USER_ROLE: &str = "user";

/// Catalog actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "Create",
            Action::Read => "Read",
            Action::Update => "Update",
            Action::Delete => "Delete",
        }
    }
}

impl FromStr for Action {
    type Err = AuthError;

    /// Exact case: `"Delete"` parses, `"delete"` does not.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| AuthError::Format(format!("unknown action {s:?}")))
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Users,
    Role,
}

impl Resource {
    pub const ALL: [Resource; 2] = [Resource::Users, Resource::Role];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Users => "users",
            Resource::Role => "role",
        }
    }
}

impl FromStr for Resource {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| AuthError::Format(format!("unknown resource {s:?}")))
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog permission. Identity is the `(action, resource)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub action: Action,
    pub resource: Resource,
}

impl Permission {
    pub const fn new(action: Action, resource: Resource) -> Self {
        Self { action, resource }
    }

    /// Stable key used by index tables, e.g. `Read:users`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.action, self.resource)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action, self.resource)
    }
}

/// Every permission in the catalog, resource-major.
pub fn catalog() -> Vec<Permission> {
    Resource::ALL
        .into_iter()
        .flat_map(|resource| Action::ALL.into_iter().map(move |action| Permission::new(action, resource)))
        .collect()
}

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::new(Action::Read, Resource::Users),
    Permission::new(Action::Update, Resource::Users),
    Permission::new(Action::Delete, Resource::Users),
    Permission::new(Action::Read, Resource::Role),
    Permission::new(Action::Update, Resource::Role),
];

const EDITOR_PERMISSIONS: &[Permission] = &[
    Permission::new(Action::Read, Resource::Users),
    Permission::new(Action::Delete, Resource::Users),
];

const USER_PERMISSIONS: &[Permission] = &[Permission::new(Action::Read, Resource::Users)];

/// Canonical role to permission mapping applied by bootstrap.
pub fn seeded_roles() -> [(&'static str, &'static [Permission]); 3] {
    [
        (ADMIN_ROLE, ADMIN_PERMISSIONS),
        (EDITOR_ROLE, EDITOR_PERMISSIONS),
        (USER_ROLE, USER_PERMISSIONS),
    ]
}

/// True iff some role held by the user grants exactly `(action, resource)`.
pub fn check_permission(grants: &UserGrants, resource: Resource, action: Action) -> bool {
    let wanted = Permission::new(action, resource);
    grants
        .roles
        .iter()
        .any(|role| role.permissions.iter().any(|p| *p == wanted))
}

/// Result of a successful user creation.
#[derive(Debug, Clone)]
pub struct CreatedUser {
    pub user: UserRecord,
    /// Role actually assigned (after any fallback).
    pub role: String,
}

/// RBAC operations backed by the store.
#[derive(Clone)]
pub struct PermissionModel {
    store: Arc<dyn AuthStore>,
}

impl PermissionModel {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Ensure the catalog and seeded roles exist and reset each seeded role to
    /// its canonical permission set.
    ///
    /// Safe to re-run: lookups are find-or-create and role permissions are
    /// replaced, not appended.
    pub async fn bootstrap(&self) -> Result<Vec<RoleRecord>, AuthError> {
        let mut stored: Vec<PermissionRecord> = Vec::new();
        for permission in catalog() {
            stored.push(self.store.find_or_create_permission(permission).await?);
        }

        let id_of = |wanted: &Permission| -> Option<PermissionId> {
            stored
                .iter()
                .find(|record| record.permission == *wanted)
                .map(|record| record.id)
        };

        let mut roles = Vec::new();
        for (name, permissions) in seeded_roles() {
            let role = self.store.find_or_create_role(name).await?;
            let ids: Vec<PermissionId> = permissions.iter().filter_map(id_of).collect();
            roles.push(self.store.replace_role_permissions(role.id, &ids).await?);
        }

        tracing::info!(
            permissions = stored.len(),
            roles = roles.len(),
            "RBAC bootstrap complete"
        );

        Ok(roles)
    }

    /// Create a user holding a single role.
    ///
    /// Requesting `admin` while any user already holds it fails with
    /// [`AuthError::Conflict`]. The store checks this inside the insert, so
    /// concurrent requests cannot both get through. A role name that
    /// does not resolve (including none at all) falls back to `user`; this
    /// downgrade is intentional policy, not an error.
    pub async fn create_user_with_role(
        &self,
        username: &str,
        password_hash: &str,
        requested_role: Option<&str>,
    ) -> Result<CreatedUser, AuthError> {
        let requested = requested_role.unwrap_or_default();
        let admin_conflict = || AuthError::Conflict("an admin already exists".to_string());

        if requested == ADMIN_ROLE && self.store.any_user_has_role(ADMIN_ROLE).await? {
            return Err(admin_conflict());
        }

        let role = match self.store.find_role_by_name(requested).await? {
            Some(role) => role,
            None => {
                if !requested.is_empty() {
                    tracing::info!(
                        requested_role = requested,
                        "unknown role requested, assigning default role"
                    );
                }
                self.store
                    .find_role_by_name(USER_ROLE)
                    .await?
                    .ok_or_else(|| AuthError::NotFound(format!("role '{USER_ROLE}' not found")))?
            }
        };

        let exclusive_role = (role.name == ADMIN_ROLE).then_some(role.id);
        let user = self
            .store
            .create_user(NewUser {
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                role_ids: vec![role.id],
                exclusive_role,
            })
            .await
            .map_err(|e| match e {
                StoreError::RoleHeld(_) => admin_conflict(),
                other => other.into(),
            })?;

        Ok(CreatedUser {
            user,
            role: role.name,
        })
    }

    /// Replace a user's whole role set with the named roles.
    ///
    /// `admin` can never be granted here; the request is rejected before any
    /// lookup. Names that do not resolve are skipped, but at least one must.
    pub async fn assign_roles(
        &self,
        username: &str,
        role_names: &[String],
    ) -> Result<(UserRecord, Vec<RoleRecord>), AuthError> {
        if role_names.iter().any(|name| name == ADMIN_ROLE) {
            return Err(AuthError::Conflict("cannot assign admin".to_string()));
        }

        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| AuthError::NotFound("user not found".to_string()))?;

        let roles = self.store.find_roles_by_names(role_names).await?;
        if roles.is_empty() {
            return Err(AuthError::NotFound("no valid roles found".to_string()));
        }

        let ids: Vec<_> = roles.iter().map(|r| r.id).collect();
        let user = self.store.replace_user_roles(user.id, &ids).await?;

        Ok((user, roles))
    }

    /// Load a user's current grants, failing with `NotFound` if absent.
    pub async fn load_grants(&self, username: &str) -> Result<UserGrants, AuthError> {
        self.store
            .load_grants_by_username(username)
            .await?
            .ok_or_else(|| AuthError::NotFound("user not found".to_string()))
    }

    /// Load a user's grants and require an exact permission.
    pub async fn require_permission(
        &self,
        username: &str,
        resource: Resource,
        action: Action,
    ) -> Result<UserGrants, AuthError> {
        let grants = self.load_grants(username).await?;
        if !check_permission(&grants, resource, action) {
            tracing::debug!(
                username,
                %resource,
                %action,
                "permission denied"
            );
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(grants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{GrantedRole, InMemoryStore};
    use chrono::Utc;

    fn grants_with(roles: Vec<(&str, &[Permission])>) -> UserGrants {
        let now = Utc::now();
        UserGrants {
            user: UserRecord {
                id: 1,
                username: "u".to_string(),
                password_hash: String::new(),
                role_ids: (1..=roles.len() as u64).collect(),
                created_at: now,
                updated_at: now,
            },
            roles: roles
                .into_iter()
                .enumerate()
                .map(|(i, (name, perms))| GrantedRole {
                    id: i as u64 + 1,
                    name: name.to_string(),
                    permissions: perms.to_vec(),
                })
                .collect(),
        }
    }

    async fn seeded() -> (Arc<InMemoryStore>, PermissionModel) {
        let store = Arc::new(InMemoryStore::new());
        let model = PermissionModel::new(store.clone());
        model.bootstrap().await.unwrap();
        (store, model)
    }

    #[test]
    fn catalog_has_eight_unique_entries() {
        let all = catalog();
        assert_eq!(all.len(), 8);
        let mut keys: Vec<String> = all.iter().map(Permission::key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 8);
    }

    #[test]
    fn names_parse_exactly() {
        assert_eq!("Delete".parse::<Action>().unwrap(), Action::Delete);
        assert!(matches!("delete".parse::<Action>(), Err(AuthError::Format(_))));
        assert_eq!("users".parse::<Resource>().unwrap(), Resource::Users);
        assert!(matches!("Users".parse::<Resource>(), Err(AuthError::Format(_))));
        for action in Action::ALL {
            assert_eq!(action.to_string().parse::<Action>().unwrap(), action);
        }
        assert_eq!(Permission::new(Action::Read, Resource::Role).key(), "Read:role");
    }

    #[test]
    fn editor_permissions_are_exact() {
        let grants = grants_with(vec![(EDITOR_ROLE, EDITOR_PERMISSIONS)]);

        assert!(check_permission(&grants, Resource::Users, Action::Delete));
        assert!(check_permission(&grants, Resource::Users, Action::Read));
        assert!(!check_permission(&grants, Resource::Role, Action::Update));
        assert!(!check_permission(&grants, Resource::Users, Action::Update));
        assert!(!check_permission(&grants, Resource::Role, Action::Delete));
    }

    #[test]
    fn permissions_union_across_roles() {
        let grants = grants_with(vec![
            (USER_ROLE, USER_PERMISSIONS),
            ("custom", &[Permission::new(Action::Update, Resource::Role)]),
        ]);
        assert!(check_permission(&grants, Resource::Users, Action::Read));
        assert!(check_permission(&grants, Resource::Role, Action::Update));
        assert!(!check_permission(&grants, Resource::Role, Action::Read));
    }

    #[test]
    fn no_roles_means_no_permissions() {
        let grants = grants_with(vec![]);
        for p in catalog() {
            assert!(!check_permission(&grants, p.resource, p.action));
        }
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let (store, model) = seeded().await;
        model.bootstrap().await.unwrap();

        let roles = store.list_roles().await.unwrap();
        assert_eq!(roles.len(), 3);
        assert_eq!(store.list_permissions().await.unwrap().len(), 8);

        let count = |name: &str| {
            roles
                .iter()
                .find(|r| r.name == name)
                .map(|r| r.permission_ids.len())
                .unwrap()
        };
        assert_eq!(count(ADMIN_ROLE), 5);
        assert_eq!(count(EDITOR_ROLE), 2);
        assert_eq!(count(USER_ROLE), 1);
    }

    #[tokio::test]
    async fn bootstrap_restores_drifted_mapping() {
        let (store, model) = seeded().await;
        let editor = store.find_role_by_name(EDITOR_ROLE).await.unwrap().unwrap();
        let every: Vec<_> = store
            .list_permissions()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        store.replace_role_permissions(editor.id, &every).await.unwrap();

        model.bootstrap().await.unwrap();

        let editor = store.find_role_by_name(EDITOR_ROLE).await.unwrap().unwrap();
        assert_eq!(editor.permission_ids.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_bootstrap_does_not_duplicate() {
        let store = Arc::new(InMemoryStore::new());
        let a = PermissionModel::new(store.clone());
        let b = PermissionModel::new(store.clone());

        let (ra, rb) = tokio::join!(a.bootstrap(), b.bootstrap());
        ra.unwrap();
        rb.unwrap();

        assert_eq!(store.list_roles().await.unwrap().len(), 3);
        assert_eq!(store.list_permissions().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn second_admin_is_rejected_without_write() {
        let (store, model) = seeded().await;
        let first = model
            .create_user_with_role("root", "hash", Some(ADMIN_ROLE))
            .await
            .unwrap();
        assert_eq!(first.role, ADMIN_ROLE);

        let err = model
            .create_user_with_role("root2", "hash", Some(ADMIN_ROLE))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));

        assert_eq!(store.list_users().await.unwrap().len(), 1);
        assert!(store.find_user_by_username("root2").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admin_requests_create_one_admin() {
        let (store, model) = seeded().await;
        let model = Arc::new(model);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let model = model.clone();
                tokio::spawn(async move {
                    model
                        .create_user_with_role(&format!("root{i}"), "hash", Some(ADMIN_ROLE))
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => created += 1,
                Err(err) => assert!(matches!(err, AuthError::Conflict(_))),
            }
        }
        assert_eq!(created, 1);

        let admin = store.find_role_by_name(ADMIN_ROLE).await.unwrap().unwrap();
        let admins = store
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .filter(|u| u.role_ids.contains(&admin.id))
            .count();
        assert_eq!(admins, 1);
    }

    #[tokio::test]
    async fn unknown_or_missing_role_falls_back_to_user() {
        let (store, model) = seeded().await;

        let created = model
            .create_user_with_role("bob", "hash", Some("superuser"))
            .await
            .unwrap();
        assert_eq!(created.role, USER_ROLE);

        let created = model
            .create_user_with_role("carol", "hash", None)
            .await
            .unwrap();
        assert_eq!(created.role, USER_ROLE);

        let grants = store.load_grants_by_username("bob").await.unwrap().unwrap();
        assert_eq!(grants.role_names(), vec![USER_ROLE.to_string()]);
    }

    #[tokio::test]
    async fn requested_known_role_is_used() {
        let (_store, model) = seeded().await;
        let created = model
            .create_user_with_role("ed", "hash", Some(EDITOR_ROLE))
            .await
            .unwrap();
        assert_eq!(created.role, EDITOR_ROLE);
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let (_store, model) = seeded().await;
        model.create_user_with_role("dup", "h", None).await.unwrap();
        let err = model.create_user_with_role("dup", "h", None).await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_without_bootstrap_reports_missing_default_role() {
        let model = PermissionModel::new(Arc::new(InMemoryStore::new()));
        let err = model.create_user_with_role("x", "h", None).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn assign_admin_is_rejected_before_lookup() {
        let (_store, model) = seeded().await;
        // The user does not exist: a Conflict (not NotFound) shows no lookup ran.
        let err = model
            .assign_roles("ghost", &["editor".to_string(), "admin".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn assign_uses_resolvable_roles_and_replaces() {
        let (store, model) = seeded().await;
        model.create_user_with_role("bob", "h", None).await.unwrap();

        let (_, roles) = model
            .assign_roles("bob", &["editor".to_string(), "bogus-role".to_string()])
            .await
            .unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, EDITOR_ROLE);

        let grants = store.load_grants_by_username("bob").await.unwrap().unwrap();
        assert_eq!(grants.role_names(), vec![EDITOR_ROLE.to_string()]);
        assert!(check_permission(&grants, Resource::Users, Action::Delete));
    }

    #[tokio::test]
    async fn assign_with_no_resolvable_roles_fails() {
        let (_store, model) = seeded().await;
        model.create_user_with_role("bob", "h", None).await.unwrap();

        let err = model
            .assign_roles("bob", &["nope".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));

        let err = model.assign_roles("ghost", &["editor".to_string()]).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn require_permission_reads_current_grants() {
        let (_store, model) = seeded().await;
        model.create_user_with_role("ed", "h", Some(EDITOR_ROLE)).await.unwrap();

        assert!(model
            .require_permission("ed", Resource::Users, Action::Delete)
            .await
            .is_ok());
        assert!(matches!(
            model
                .require_permission("ed", Resource::Role, Action::Update)
                .await,
            Err(AuthError::InsufficientPermissions)
        ));
        assert!(matches!(
            model
                .require_permission("nobody", Resource::Users, Action::Read)
                .await,
            Err(AuthError::NotFound(_))
        ));
    }
}
