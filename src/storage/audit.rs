// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for privileged mutations.
//!
//! User create/update/delete, role reassignment and privileged role reads are
//! appended to the store's audit log. Writes are best-effort: a failed append
//! is logged at error level and counted, and the caller gets an explicit
//! [`AuditOutcome`], but the primary operation is never rolled back.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use super::{AuthStore, NewAuditEntry};
use crate::auth::rbac::{Action, Resource};

const TRACING_TARGET: &str = "relational_admin::audit";

/// Result of a single audit append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Entry persisted with this id.
    Recorded(u64),
    /// Entry was not persisted; the primary operation still stands.
    Failed(String),
}

impl AuditOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, AuditOutcome::Recorded(_))
    }
}

/// Append-only recorder of privileged actions.
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn AuthStore>,
    failures: Arc<AtomicU64>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self {
            store,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append one entry for `actor`.
    pub async fn record(
        &self,
        actor: &str,
        action: Action,
        resource: Resource,
        details: impl Into<String>,
    ) -> AuditOutcome {
        let entry = NewAuditEntry {
            username: actor.to_string(),
            action,
            resource,
            details: details.into(),
        };

        match self.store.append_audit(entry).await {
            Ok(stored) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    audit_id = stored.id,
                    actor,
                    %action,
                    %resource,
                    "audit entry recorded"
                );
                AuditOutcome::Recorded(stored.id)
            }
            Err(e) => {
                let total = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::error!(
                    target: TRACING_TARGET,
                    error = %e,
                    actor,
                    %action,
                    %resource,
                    audit_failures = total,
                    "failed to record audit entry"
                );
                AuditOutcome::Failed(e.to_string())
            }
        }
    }

    /// Number of appends that failed since startup.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
