// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! The persistence contract consumed by the auth core, plus two backends.
//!
//! ## Data Layout
//!
//! Associations are adjacency lists keyed by numeric ids rather than embedded
//! object graphs:
//!
//! ```text
//! user        { id, username, password_hash, role_ids[] }
//! role        { id, name, permission_ids[] }
//! permission  { id, action, resource }        unique by (action, resource)
//! audit_log   { id, username, action, resource, details, created_at }
//! ```
//!
//! "Eager loading" is the explicit [`AuthStore::load_grants_by_username`] /
//! [`AuthStore::load_grants_by_id`] query, which resolves a user's roles and
//! each role's permissions into a [`UserGrants`] value.
//!
//! ## Backends
//!
//! - [`InMemoryStore`] - process-local, for development and tests
//! - [`RedbStore`] - embedded ACID database file under `DATA_DIR`

pub mod audit;
pub mod database;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::rbac::{Action, Permission, Resource};

pub use audit::{AuditOutcome, AuditTrail};
pub use database::RedbStore;
pub use memory::InMemoryStore;

pub type UserId = u64;
pub type RoleId = u64;
pub type PermissionId = u64;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("role {0} is already held")]
    RoleHeld(RoleId),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    /// Encoded Argon2id hash. Never serialized into API responses.
    pub password_hash: String,
    /// Assigned roles, sorted and deduplicated.
    pub role_ids: Vec<RoleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: String,
    /// Granted permissions, sorted and deduplicated.
    pub permission_ids: Vec<PermissionId>,
}

/// A stored catalog permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub id: PermissionId,
    pub permission: Permission,
}

/// Input for [`AuthStore::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role_ids: Vec<RoleId>,
    /// Refuse the insert with [`StoreError::RoleHeld`] if any user already
    /// holds this role. Checked in the same write as the insert.
    pub exclusive_role: Option<RoleId>,
}

/// Partial update for [`AuthStore::update_user`].
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub password_hash: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password_hash.is_none()
    }
}

/// A role resolved together with its permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantedRole {
    pub id: RoleId,
    pub name: String,
    pub permissions: Vec<Permission>,
}

/// A user with roles and permissions loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGrants {
    pub user: UserRecord,
    pub roles: Vec<GrantedRole>,
}

impl UserGrants {
    /// Role names, in role id order.
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }

    /// Whether the user currently holds the named role.
    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }
}

/// An append-only audit log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuditLogEntry {
    pub id: u64,
    /// Actor performing the action.
    pub username: String,
    pub action: Action,
    pub resource: Resource,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

/// Input for [`AuthStore::append_audit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub username: String,
    pub action: Action,
    pub resource: Resource,
    pub details: String,
}

/// Persistence operations required by the auth core.
///
/// Every method is a single atomic read or read-modify-write; callers never
/// hold a lock across calls.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>>;

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>>;

    /// User with roles and permissions resolved.
    async fn load_grants_by_username(&self, username: &str) -> StoreResult<Option<UserGrants>>;

    /// User with roles and permissions resolved.
    async fn load_grants_by_id(&self, id: UserId) -> StoreResult<Option<UserGrants>>;

    /// All users ordered by id.
    async fn list_users(&self) -> StoreResult<Vec<UserRecord>>;

    /// Fails with [`StoreError::AlreadyExists`] on a duplicate username and
    /// [`StoreError::NotFound`] on an unknown role id.
    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord>;

    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<UserRecord>;

    /// Clears the user's role associations, then removes the row.
    async fn delete_user(&self, id: UserId) -> StoreResult<UserRecord>;

    /// Replace the user's entire role set.
    async fn replace_user_roles(&self, id: UserId, role_ids: &[RoleId]) -> StoreResult<UserRecord>;

    /// Whether any user currently holds the named role.
    async fn any_user_has_role(&self, role_name: &str) -> StoreResult<bool>;

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<RoleRecord>>;

    /// Roles whose names appear in `names`; unknown names are skipped.
    async fn find_roles_by_names(&self, names: &[String]) -> StoreResult<Vec<RoleRecord>>;

    async fn list_roles(&self) -> StoreResult<Vec<RoleRecord>>;

    async fn find_or_create_role(&self, name: &str) -> StoreResult<RoleRecord>;

    async fn find_or_create_permission(&self, permission: Permission) -> StoreResult<PermissionRecord>;

    async fn list_permissions(&self) -> StoreResult<Vec<PermissionRecord>>;

    /// Replace the role's entire permission set.
    async fn replace_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> StoreResult<RoleRecord>;

    async fn append_audit(&self, entry: NewAuditEntry) -> StoreResult<AuditLogEntry>;

    /// All audit entries in insertion order.
    async fn list_audit(&self) -> StoreResult<Vec<AuditLogEntry>>;
}

/// Sort and deduplicate an id list.
pub(crate) fn normalize_ids(ids: &[u64]) -> Vec<u64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}
