// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded auth database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user id → serialized [`UserRecord`]
//! - `usernames`: username → user id (unique index)
//! - `roles`: role id → serialized [`RoleRecord`]
//! - `role_names`: role name → role id (unique index)
//! - `permissions`: permission id → serialized [`PermissionRecord`]
//! - `permission_keys`: `Action:resource` → permission id (unique index)
//! - `audit_log`: entry id → serialized [`AuditLogEntry`]
//! - `sequences`: table name → last allocated id
//!
//! Every trait method runs in exactly one redb transaction. Write
//! transactions are serialized by redb, which makes find-or-create and
//! uniqueness checks atomic.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction,
};
use serde::de::DeserializeOwned;

use super::{
    normalize_ids, AuditLogEntry, AuthStore, GrantedRole, NewAuditEntry, NewUser, PermissionId,
    PermissionRecord, RoleId, RoleRecord, StoreError, StoreResult, UserChanges, UserGrants,
    UserId, UserRecord,
};
use crate::auth::rbac::Permission;

// =============================================================================
// Table Definitions
// =============================================================================

const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
const USERNAMES: TableDefinition<&str, u64> = TableDefinition::new("usernames");
const ROLES: TableDefinition<u64, &[u8]> = TableDefinition::new("roles");
const ROLE_NAMES: TableDefinition<&str, u64> = TableDefinition::new("role_names");
const PERMISSIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("permissions");
const PERMISSION_KEYS: TableDefinition<&str, u64> = TableDefinition::new("permission_keys");
const AUDIT_LOG: TableDefinition<u64, &[u8]> = TableDefinition::new("audit_log");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// File name of the database inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "auth.redb";

// =============================================================================
// Row Helpers
// =============================================================================

fn load<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> StoreResult<Option<T>> {
    match table.get(id)? {
        Some(raw) => Ok(Some(serde_json::from_slice(raw.value())?)),
        None => Ok(None),
    }
}

fn load_all<T: DeserializeOwned>(table: &impl ReadableTable<u64, &'static [u8]>) -> StoreResult<Vec<T>> {
    let mut rows = Vec::new();
    for entry in table.iter()? {
        let (_, raw) = entry?;
        rows.push(serde_json::from_slice(raw.value())?);
    }
    Ok(rows)
}

fn lookup(table: &impl ReadableTable<&'static str, u64>, key: &str) -> StoreResult<Option<u64>> {
    Ok(table.get(key)?.map(|v| v.value()))
}

/// Allocate the next id for `sequence`. Ids start at 1.
fn next_id(txn: &WriteTransaction, sequence: &str) -> StoreResult<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let current = table.get(sequence)?.map(|v| v.value()).unwrap_or(0);
    let next = current + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

fn ensure_roles_exist(txn: &WriteTransaction, role_ids: &[RoleId]) -> StoreResult<()> {
    let roles = txn.open_table(ROLES)?;
    for id in role_ids {
        if roles.get(*id)?.is_none() {
            return Err(StoreError::NotFound(format!("role {id}")));
        }
    }
    Ok(())
}

fn read_grants(txn: &ReadTransaction, user: UserRecord) -> StoreResult<UserGrants> {
    let roles_table = txn.open_table(ROLES)?;
    let permissions_table = txn.open_table(PERMISSIONS)?;

    let mut roles = Vec::with_capacity(user.role_ids.len());
    for role_id in &user.role_ids {
        let Some(role) = load::<RoleRecord>(&roles_table, *role_id)? else {
            continue;
        };
        let mut permissions = Vec::with_capacity(role.permission_ids.len());
        for permission_id in &role.permission_ids {
            if let Some(record) = load::<PermissionRecord>(&permissions_table, *permission_id)? {
                permissions.push(record.permission);
            }
        }
        roles.push(GrantedRole {
            id: role.id,
            name: role.name,
            permissions,
        });
    }

    Ok(UserGrants { user, roles })
}

// =============================================================================
// RedbStore
// =============================================================================

/// Embedded ACID [`AuthStore`].
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("create {}: {e}", parent.display())))?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERNAMES)?;
            let _ = write_txn.open_table(ROLES)?;
            let _ = write_txn.open_table(ROLE_NAMES)?;
            let _ = write_txn.open_table(PERMISSIONS)?;
            let _ = write_txn.open_table(PERMISSION_KEYS)?;
            let _ = write_txn.open_table(AUDIT_LOG)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Opened auth database");

        Ok(Self { db })
    }

    /// Open `auth.redb` inside `dir`.
    pub fn open_in_dir(dir: &Path) -> StoreResult<Self> {
        Self::open(&dir.join(DATABASE_FILE))
    }

    fn read<T>(&self, f: impl FnOnce(&ReadTransaction) -> StoreResult<T>) -> StoreResult<T> {
        let txn = self.db.begin_read()?;
        f(&txn)
    }

    /// Run `f` in a write transaction, committing on success and aborting on error.
    fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> StoreResult<T>) -> StoreResult<T> {
        let txn = self.db.begin_write()?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.abort()?;
                Err(e)
            }
        }
    }

    fn user_by_name(txn: &ReadTransaction, username: &str) -> StoreResult<Option<UserRecord>> {
        let names = txn.open_table(USERNAMES)?;
        let Some(id) = lookup(&names, username)? else {
            return Ok(None);
        };
        let users = txn.open_table(USERS)?;
        load(&users, id)
    }

    fn role_by_name(txn: &ReadTransaction, name: &str) -> StoreResult<Option<RoleRecord>> {
        let names = txn.open_table(ROLE_NAMES)?;
        let Some(id) = lookup(&names, name)? else {
            return Ok(None);
        };
        let roles = txn.open_table(ROLES)?;
        load(&roles, id)
    }
}

#[async_trait]
impl AuthStore for RedbStore {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        self.read(|txn| Self::user_by_name(txn, username))
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        self.read(|txn| load(&txn.open_table(USERS)?, id))
    }

    async fn load_grants_by_username(&self, username: &str) -> StoreResult<Option<UserGrants>> {
        self.read(|txn| match Self::user_by_name(txn, username)? {
            Some(user) => Ok(Some(read_grants(txn, user)?)),
            None => Ok(None),
        })
    }

    async fn load_grants_by_id(&self, id: UserId) -> StoreResult<Option<UserGrants>> {
        self.read(|txn| match load::<UserRecord>(&txn.open_table(USERS)?, id)? {
            Some(user) => Ok(Some(read_grants(txn, user)?)),
            None => Ok(None),
        })
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        self.read(|txn| load_all(&txn.open_table(USERS)?))
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        self.write(|txn| {
            if lookup(&txn.open_table(USERNAMES)?, &user.username)?.is_some() {
                return Err(StoreError::AlreadyExists(format!("user '{}'", user.username)));
            }
            if let Some(role) = user.exclusive_role {
                let users: Vec<UserRecord> = load_all(&txn.open_table(USERS)?)?;
                if users.iter().any(|u| u.role_ids.contains(&role)) {
                    return Err(StoreError::RoleHeld(role));
                }
            }
            let role_ids = normalize_ids(&user.role_ids);
            ensure_roles_exist(txn, &role_ids)?;

            let id = next_id(txn, "users")?;
            let now = Utc::now();
            let record = UserRecord {
                id,
                username: user.username,
                password_hash: user.password_hash,
                role_ids,
                created_at: now,
                updated_at: now,
            };

            let json = serde_json::to_vec(&record)?;
            txn.open_table(USERS)?.insert(id, json.as_slice())?;
            txn.open_table(USERNAMES)?.insert(record.username.as_str(), id)?;
            Ok(record)
        })
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<UserRecord> {
        self.write(|txn| {
            let mut users = txn.open_table(USERS)?;
            let mut user: UserRecord =
                load(&users, id)?.ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;

            if let Some(name) = changes.username {
                if name != user.username {
                    let mut names = txn.open_table(USERNAMES)?;
                    if lookup(&names, &name)?.is_some() {
                        return Err(StoreError::AlreadyExists(format!("user '{name}'")));
                    }
                    names.remove(user.username.as_str())?;
                    names.insert(name.as_str(), id)?;
                    user.username = name;
                }
            }
            if let Some(hash) = changes.password_hash {
                user.password_hash = hash;
            }
            user.updated_at = Utc::now();

            let json = serde_json::to_vec(&user)?;
            users.insert(id, json.as_slice())?;
            Ok(user)
        })
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<UserRecord> {
        self.write(|txn| {
            let mut users = txn.open_table(USERS)?;
            let mut user: UserRecord =
                load(&users, id)?.ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
            user.role_ids.clear();

            users.remove(id)?;
            txn.open_table(USERNAMES)?.remove(user.username.as_str())?;
            Ok(user)
        })
    }

    async fn replace_user_roles(&self, id: UserId, role_ids: &[RoleId]) -> StoreResult<UserRecord> {
        let role_ids = normalize_ids(role_ids);
        self.write(|txn| {
            ensure_roles_exist(txn, &role_ids)?;

            let mut users = txn.open_table(USERS)?;
            let mut user: UserRecord =
                load(&users, id)?.ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
            user.role_ids = role_ids;
            user.updated_at = Utc::now();

            let json = serde_json::to_vec(&user)?;
            users.insert(id, json.as_slice())?;
            Ok(user)
        })
    }

    async fn any_user_has_role(&self, role_name: &str) -> StoreResult<bool> {
        self.read(|txn| {
            let Some(role_id) = lookup(&txn.open_table(ROLE_NAMES)?, role_name)? else {
                return Ok(false);
            };
            let users: Vec<UserRecord> = load_all(&txn.open_table(USERS)?)?;
            Ok(users.iter().any(|u| u.role_ids.contains(&role_id)))
        })
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<RoleRecord>> {
        self.read(|txn| Self::role_by_name(txn, name))
    }

    async fn find_roles_by_names(&self, names: &[String]) -> StoreResult<Vec<RoleRecord>> {
        self.read(|txn| {
            let index = txn.open_table(ROLE_NAMES)?;
            let mut ids = Vec::with_capacity(names.len());
            for name in names {
                if let Some(id) = lookup(&index, name)? {
                    ids.push(id);
                }
            }

            let roles = txn.open_table(ROLES)?;
            let mut found = Vec::with_capacity(ids.len());
            for id in normalize_ids(&ids) {
                if let Some(role) = load(&roles, id)? {
                    found.push(role);
                }
            }
            Ok(found)
        })
    }

    async fn list_roles(&self) -> StoreResult<Vec<RoleRecord>> {
        self.read(|txn| load_all(&txn.open_table(ROLES)?))
    }

    async fn find_or_create_role(&self, name: &str) -> StoreResult<RoleRecord> {
        self.write(|txn| {
            if let Some(id) = lookup(&txn.open_table(ROLE_NAMES)?, name)? {
                return load(&txn.open_table(ROLES)?, id)?
                    .ok_or_else(|| StoreError::Backend(format!("role index points at missing role {id}")));
            }

            let id = next_id(txn, "roles")?;
            let role = RoleRecord {
                id,
                name: name.to_string(),
                permission_ids: Vec::new(),
            };
            let json = serde_json::to_vec(&role)?;
            txn.open_table(ROLES)?.insert(id, json.as_slice())?;
            txn.open_table(ROLE_NAMES)?.insert(name, id)?;
            Ok(role)
        })
    }

    async fn find_or_create_permission(&self, permission: Permission) -> StoreResult<PermissionRecord> {
        let key = permission.key();
        self.write(|txn| {
            if let Some(id) = lookup(&txn.open_table(PERMISSION_KEYS)?, &key)? {
                return load(&txn.open_table(PERMISSIONS)?, id)?.ok_or_else(|| {
                    StoreError::Backend(format!("permission index points at missing permission {id}"))
                });
            }

            let id = next_id(txn, "permissions")?;
            let record = PermissionRecord { id, permission };
            let json = serde_json::to_vec(&record)?;
            txn.open_table(PERMISSIONS)?.insert(id, json.as_slice())?;
            txn.open_table(PERMISSION_KEYS)?.insert(key.as_str(), id)?;
            Ok(record)
        })
    }

    async fn list_permissions(&self) -> StoreResult<Vec<PermissionRecord>> {
        self.read(|txn| load_all(&txn.open_table(PERMISSIONS)?))
    }

    async fn replace_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> StoreResult<RoleRecord> {
        let permission_ids = normalize_ids(permission_ids);
        self.write(|txn| {
            {
                let permissions = txn.open_table(PERMISSIONS)?;
                for id in &permission_ids {
                    if permissions.get(*id)?.is_none() {
                        return Err(StoreError::NotFound(format!("permission {id}")));
                    }
                }
            }

            let mut roles = txn.open_table(ROLES)?;
            let mut role: RoleRecord = load(&roles, role_id)?
                .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))?;
            role.permission_ids = permission_ids;

            let json = serde_json::to_vec(&role)?;
            roles.insert(role_id, json.as_slice())?;
            Ok(role)
        })
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> StoreResult<AuditLogEntry> {
        self.write(|txn| {
            let id = next_id(txn, "audit_log")?;
            let record = AuditLogEntry {
                id,
                username: entry.username,
                action: entry.action,
                resource: entry.resource,
                details: entry.details,
                created_at: Utc::now(),
            };
            let json = serde_json::to_vec(&record)?;
            txn.open_table(AUDIT_LOG)?.insert(id, json.as_slice())?;
            Ok(record)
        })
    }

    async fn list_audit(&self) -> StoreResult<Vec<AuditLogEntry>> {
        self.read(|txn| load_all(&txn.open_table(AUDIT_LOG)?))
    }
}
