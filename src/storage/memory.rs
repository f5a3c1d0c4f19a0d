// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Process-local store for development and tests.
//!
//! All tables sit behind one lock so every trait method is a single critical
//! section; find-or-create and check-then-insert are atomic here.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    normalize_ids, AuditLogEntry, AuthStore, GrantedRole, NewAuditEntry, NewUser, PermissionId,
    PermissionRecord, RoleId, RoleRecord, StoreError, StoreResult, UserChanges, UserGrants,
    UserId, UserRecord,
};
use crate::auth::rbac::Permission;

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, UserRecord>,
    roles: BTreeMap<RoleId, RoleRecord>,
    permissions: BTreeMap<PermissionId, PermissionRecord>,
    audit: Vec<AuditLogEntry>,
    next_user: u64,
    next_role: u64,
    next_permission: u64,
}

impl Tables {
    fn next(counter: &mut u64) -> u64 {
        *counter += 1;
        *counter
    }

    fn user_by_name(&self, username: &str) -> Option<&UserRecord> {
        self.users.values().find(|u| u.username == username)
    }

    fn role_by_name(&self, name: &str) -> Option<&RoleRecord> {
        self.roles.values().find(|r| r.name == name)
    }

    fn grants(&self, user: &UserRecord) -> UserGrants {
        let roles = user
            .role_ids
            .iter()
            .filter_map(|id| self.roles.get(id))
            .map(|role| GrantedRole {
                id: role.id,
                name: role.name.clone(),
                permissions: role
                    .permission_ids
                    .iter()
                    .filter_map(|pid| self.permissions.get(pid))
                    .map(|p| p.permission)
                    .collect(),
            })
            .collect();
        UserGrants {
            user: user.clone(),
            roles,
        }
    }

    fn ensure_roles_exist(&self, role_ids: &[RoleId]) -> StoreResult<()> {
        match role_ids.iter().find(|id| !self.roles.contains_key(*id)) {
            Some(missing) => Err(StoreError::NotFound(format!("role {missing}"))),
            None => Ok(()),
        }
    }
}

/// In-memory [`AuthStore`].
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for InMemoryStore {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.tables.read().await.user_by_name(username).cloned())
    }

    async fn find_user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn load_grants_by_username(&self, username: &str) -> StoreResult<Option<UserGrants>> {
        let tables = self.tables.read().await;
        Ok(tables.user_by_name(username).map(|u| tables.grants(u)))
    }

    async fn load_grants_by_id(&self, id: UserId) -> StoreResult<Option<UserGrants>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).map(|u| tables.grants(u)))
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<UserRecord> {
        let mut tables = self.tables.write().await;

        if tables.user_by_name(&user.username).is_some() {
            return Err(StoreError::AlreadyExists(format!("user '{}'", user.username)));
        }
        if let Some(role) = user.exclusive_role {
            if tables.users.values().any(|u| u.role_ids.contains(&role)) {
                return Err(StoreError::RoleHeld(role));
            }
        }
        let role_ids = normalize_ids(&user.role_ids);
        tables.ensure_roles_exist(&role_ids)?;

        let id = Tables::next(&mut tables.next_user);
        let now = Utc::now();
        let record = UserRecord {
            id,
            username: user.username,
            password_hash: user.password_hash,
            role_ids,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(id, record.clone());
        Ok(record)
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> StoreResult<UserRecord> {
        let mut tables = self.tables.write().await;

        if let Some(name) = &changes.username {
            if tables.user_by_name(name).is_some_and(|other| other.id != id) {
                return Err(StoreError::AlreadyExists(format!("user '{name}'")));
            }
        }

        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        if let Some(name) = changes.username {
            user.username = name;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<UserRecord> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.role_ids.clear();
        tables
            .users
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    async fn replace_user_roles(&self, id: UserId, role_ids: &[RoleId]) -> StoreResult<UserRecord> {
        let mut tables = self.tables.write().await;
        let role_ids = normalize_ids(role_ids);
        tables.ensure_roles_exist(&role_ids)?;

        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.role_ids = role_ids;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn any_user_has_role(&self, role_name: &str) -> StoreResult<bool> {
        let tables = self.tables.read().await;
        let Some(role) = tables.role_by_name(role_name) else {
            return Ok(false);
        };
        Ok(tables.users.values().any(|u| u.role_ids.contains(&role.id)))
    }

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<RoleRecord>> {
        Ok(self.tables.read().await.role_by_name(name).cloned())
    }

    async fn find_roles_by_names(&self, names: &[String]) -> StoreResult<Vec<RoleRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .roles
            .values()
            .filter(|r| names.iter().any(|n| n == &r.name))
            .cloned()
            .collect())
    }

    async fn list_roles(&self) -> StoreResult<Vec<RoleRecord>> {
        Ok(self.tables.read().await.roles.values().cloned().collect())
    }

    async fn find_or_create_role(&self, name: &str) -> StoreResult<RoleRecord> {
        let mut tables = self.tables.write().await;
        if let Some(role) = tables.role_by_name(name) {
            return Ok(role.clone());
        }
        let id = Tables::next(&mut tables.next_role);
        let role = RoleRecord {
            id,
            name: name.to_string(),
            permission_ids: Vec::new(),
        };
        tables.roles.insert(id, role.clone());
        Ok(role)
    }

    async fn find_or_create_permission(&self, permission: Permission) -> StoreResult<PermissionRecord> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .permissions
            .values()
            .find(|p| p.permission == permission)
        {
            return Ok(*existing);
        }
        let id = Tables::next(&mut tables.next_permission);
        let record = PermissionRecord { id, permission };
        tables.permissions.insert(id, record);
        Ok(record)
    }

    async fn list_permissions(&self) -> StoreResult<Vec<PermissionRecord>> {
        Ok(self.tables.read().await.permissions.values().copied().collect())
    }

    async fn replace_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> StoreResult<RoleRecord> {
        let mut tables = self.tables.write().await;
        let permission_ids = normalize_ids(permission_ids);
        if let Some(missing) = permission_ids
            .iter()
            .find(|id| !tables.permissions.contains_key(*id))
        {
            return Err(StoreError::NotFound(format!("permission {missing}")));
        }

        let role = tables
            .roles
            .get_mut(&role_id)
            .ok_or_else(|| StoreError::NotFound(format!("role {role_id}")))?;
        role.permission_ids = permission_ids;
        Ok(role.clone())
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> StoreResult<AuditLogEntry> {
        let mut tables = self.tables.write().await;
        let record = AuditLogEntry {
            id: tables.audit.len() as u64 + 1,
            username: entry.username,
            action: entry.action,
            resource: entry.resource,
            details: entry.details,
            created_at: Utc::now(),
        };
        tables.audit.push(record.clone());
        Ok(record)
    }

    async fn list_audit(&self) -> StoreResult<Vec<AuditLogEntry>> {
        Ok(self.tables.read().await.audit.clone())
    }
}
