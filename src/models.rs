// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies for the REST API. Requests derive `Validate`
//! for field constraints; every type derives `ToSchema` for the OpenAPI
//! document.
//!
//! Password hashes never appear in any response type.
//!
//! ## Model Categories
//!
//! - **Users**: registration, profile updates, listings
//! - **Sessions**: login and privileged-session tokens
//! - **Roles**: role inspection and reassignment

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::storage::{RoleRecord, UserGrants, UserRecord};

// =============================================================================
// User Models
// =============================================================================

/// Registration request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 255))]
    pub username: String,
    #[validate(length(min = 6))]
    pub password: String,
    /// Requested role. Unknown names fall back to `user`.
    #[serde(default)]
    pub role: Option<String>,
}

/// Partial profile update. At least one field must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateUserRequest {
    #[serde(default)]
    #[validate(length(min = 3, max = 255))]
    pub username: Option<String>,
    #[serde(default)]
    #[validate(length(min = 6))]
    pub password: Option<String>,
}

/// Public view of a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserSummary {
    pub id: u64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserRecord> for UserSummary {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Registration result.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatedUserResponse {
    #[serde(flatten)]
    pub user: UserSummary,
    /// Role actually assigned.
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeletedUserResponse {
    pub message: String,
    pub user: UserSummary,
}

// =============================================================================
// Session Models
// =============================================================================

/// Login request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    /// Accepted for client compatibility and ignored.
    #[serde(default)]
    pub role: Option<String>,
}

/// Issued session token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub message: String,
    pub jwt_token: String,
    /// Seconds until the token expires.
    pub expires_in: i64,
    pub is_privileged: bool,
}

// =============================================================================
// Role Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct RoleSummary {
    pub id: u64,
    pub name: String,
}

impl From<&RoleRecord> for RoleSummary {
    fn from(role: &RoleRecord) -> Self {
        Self {
            id: role.id,
            name: role.name.clone(),
        }
    }
}

/// A user together with current role names.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserWithRoles {
    pub id: u64,
    pub username: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserGrants> for UserWithRoles {
    fn from(grants: &UserGrants) -> Self {
        Self {
            id: grants.user.id,
            username: grants.user.username.clone(),
            roles: grants.role_names(),
            created_at: grants.user.created_at,
            updated_at: grants.user.updated_at,
        }
    }
}

/// Replace a user's roles.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct AssignRolesRequest {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignRolesResponse {
    pub message: String,
    pub user_id: u64,
    pub username: String,
    pub roles: Vec<RoleSummary>,
}
