// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use relational_admin_server::{
    api::router,
    auth::{PasswordCodec, TokenService},
    config::{AppConfig, JWT_SECRET_ENV},
    server::{self, ServerError},
    state::AppState,
    storage::{AuthStore, InMemoryStore, RedbStore},
    telemetry::init_tracing,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| ServerError::CryptoProvider)?;

    let config = AppConfig::from_env();
    init_tracing(config.log_format)?;
    tracing::info!(?config, "configuration loaded");

    if config.jwt_secret.is_none() {
        tracing::warn!("{JWT_SECRET_ENV} is not set; every token operation will fail");
    }

    let store: Arc<dyn AuthStore> = match &config.data_dir {
        Some(dir) => {
            tracing::info!(data_dir = %dir.display(), "using redb store");
            Arc::new(RedbStore::open_in_dir(dir)?)
        }
        None => {
            tracing::warn!("data directory not configured; state is lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    let passwords = PasswordCodec::new(config.hash_params)?;
    let tokens = TokenService::new(config.jwt_secret.as_deref());
    let state = AppState::new(store, passwords, tokens).with_request_timeout(config.request_timeout);
    state.permissions.bootstrap().await?;

    let shutdown = CancellationToken::new();
    server::cancel_on_signal(shutdown.clone());

    server::serve(router(state), &config, shutdown).await
}
