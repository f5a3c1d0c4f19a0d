// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{sync::Arc, time::Duration};

use crate::auth::{PasswordCodec, PermissionModel, TokenService};
use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::storage::{AuditTrail, AuthStore, InMemoryStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AuthStore>,
    pub passwords: PasswordCodec,
    pub tokens: TokenService,
    pub permissions: PermissionModel,
    pub audit: AuditTrail,
    /// Upper bound on a single request, enforced by the deadline layer.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn AuthStore>, passwords: PasswordCodec, tokens: TokenService) -> Self {
        Self {
            permissions: PermissionModel::new(store.clone()),
            audit: AuditTrail::new(store.clone()),
            store,
            passwords,
            tokens,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(
            Arc::new(InMemoryStore::new()),
            PasswordCodec::default(),
            TokenService::new(None),
        )
    }
}

#[cfg(test)]
pub(crate) const TEST_SECRET: &str = "test-signing-secret";

/// Bootstrapped in-memory state with cheap hashing and a signing secret.
#[cfg(test)]
pub(crate) async fn test_state() -> AppState {
    test_state_with_store(Arc::new(InMemoryStore::new())).await
}

#[cfg(test)]
pub(crate) async fn test_state_with_store(store: Arc<dyn AuthStore>) -> AppState {
    let state = AppState::new(
        store,
        crate::auth::password::cheap_codec(),
        TokenService::new(Some(TEST_SECRET)),
    );
    state
        .permissions
        .bootstrap()
        .await
        .expect("bootstrap in-memory store");
    state
}
