// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Admin - Authentication & Authorization Service
//!
//! Credential storage, session tokens, role-based access control and an
//! audit trail for the administrative backend.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Password hashing, session tokens, RBAC and the auth middleware
//! - `storage` - Store contract with in-memory and redb backends, audit trail
//! - `extract` - Validating JSON body extractor
//! - `server` - HTTP/HTTPS startup and graceful shutdown

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod server;
pub mod state;
pub mod storage;
pub mod telemetry;
