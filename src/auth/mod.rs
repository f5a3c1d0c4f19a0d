// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Local credential authentication and role-based authorization for the
//! admin API.
//!
//! ## Auth Flow
//!
//! 1. Client posts username and password to `/login`
//! 2. Server verifies the Argon2id hash and issues an HS256 session token
//! 3. Client sends `Authorization: Bearer <token>` on later requests
//! 4. Server:
//!    - validates signature, algorithm and expiry (`require_auth`)
//!    - attaches a typed [`Identity`] to the request
//!    - on admin routes, reloads the user's roles from the store and
//!      requires `admin` (`require_admin`)
//!
//! ## Security
//!
//! - Unknown user and wrong password produce the same response
//! - Token validation fails closed without a signing secret
//! - Authorization never trusts the role snapshot inside the token

pub mod claims;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod password;
pub mod rbac;
pub mod token;

pub use claims::{Identity, SessionClaims};
pub use error::AuthError;
pub use extractor::{Auth, AdminGrants};
pub use password::{HashParams, PasswordCodec, PasswordError};
pub use rbac::{check_permission, Action, Permission, PermissionModel, Resource};
pub use token::{TokenError, TokenService};
