// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Server startup and graceful shutdown.
//!
//! Serves HTTPS when a certificate pair is configured and plain HTTP
//! otherwise. SIGINT and SIGTERM cancel a shared [`CancellationToken`];
//! in-flight requests then get [`SHUTDOWN_GRACE`] to finish.

use std::{net::SocketAddr, time::Duration};

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthError, PasswordError};
use crate::config::{AppConfig, TlsPaths};
use crate::storage::StoreError;

/// Time allowed for in-flight requests after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid bind address '{0}'")]
    BindAddress(String),
    #[error("Failed to install rustls crypto provider")]
    CryptoProvider,
    #[error("Failed to load TLS certificates: {0}")]
    Tls(String),
    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),
    #[error("Invalid password hashing parameters: {0}")]
    HashParams(#[from] PasswordError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Startup failed: {0}")]
    Startup(#[from] AuthError),
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves once SIGINT or SIGTERM is received.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        } else {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match unix::signal(unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                tracing::info!("Received SIGTERM signal, initiating graceful shutdown");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Cancel `token` when a shutdown signal arrives.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });
}

/// Serve `app` until `shutdown` is cancelled.
pub async fn serve(
    app: Router,
    config: &AppConfig,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|_| ServerError::BindAddress(config.bind_address()))?;

    match &config.tls {
        Some(paths) => serve_https(app, addr, paths, shutdown).await?,
        None => serve_http(app, addr, shutdown).await?,
    }

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn serve_http(
    app: Router,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening (docs at /docs)");
    tracing::warn!("TLS is not configured; serving plain HTTP");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn serve_https(
    app: Router,
    addr: SocketAddr,
    paths: &TlsPaths,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let tls_config = RustlsConfig::from_pem_file(&paths.cert, &paths.key)
        .await
        .map_err(|e| ServerError::Tls(e.to_string()))?;

    tracing::info!(
        cert_path = %paths.cert.display(),
        key_path = %paths.key.display(),
        "TLS certificates loaded successfully"
    );

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    tracing::info!(%addr, "HTTPS server listening (docs at /docs)");
    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
