// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `JWT_SECRET` | HMAC secret for session tokens | Required; tokens fail closed without it |
//! | `DATA_DIR` | Directory holding `auth.redb` | Unset: in-memory store |
//! | `REQUEST_TIMEOUT_SECS` | Per-request deadline | `30` |
//! | `ARGON2_MEMORY_KIB` | Argon2id memory cost for new hashes | `65536` |
//! | `ARGON2_ITERATIONS` | Argon2id time cost for new hashes | `1` |
//! | `ARGON2_PARALLELISM` | Argon2id lanes for new hashes | `4` |
//! | `TLS_CERT_PATH` | PEM certificate chain | Unset: plain HTTP |
//! | `TLS_KEY_PATH` | PEM private key | Unset: plain HTTP |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::{path::PathBuf, time::Duration};

use crate::auth::HashParams;

/// Environment variable name for the bind address.
pub const HOST_ENV: &str = "HOST";

/// Environment variable name for the bind port.
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the token signing secret.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

/// Environment variable name for the database directory.
///
/// When set, users, roles, permissions and the audit log are persisted in
/// `$DATA_DIR/auth.redb`.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const REQUEST_TIMEOUT_ENV: &str = "REQUEST_TIMEOUT_SECS";
pub const ARGON2_MEMORY_ENV: &str = "ARGON2_MEMORY_KIB";
pub const ARGON2_ITERATIONS_ENV: &str = "ARGON2_ITERATIONS";
pub const ARGON2_PARALLELISM_ENV: &str = "ARGON2_PARALLELISM";
pub const TLS_CERT_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_ENV: &str = "TLS_KEY_PATH";

/// Environment variable name for the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// PEM file pair for HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Startup configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub request_timeout: Duration,
    pub hash_params: HashParams,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("data_dir", &self.data_dir)
            .field("request_timeout", &self.request_timeout)
            .field("hash_params", &self.hash_params)
            .field("tls", &self.tls)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = HashParams::default();

        let tls = match (get(TLS_CERT_ENV), get(TLS_KEY_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => {
                tracing::warn!(
                    "only one of {TLS_CERT_ENV} and {TLS_KEY_ENV} is set; serving plain HTTP"
                );
                None
            }
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(get(PORT_ENV), PORT_ENV, DEFAULT_PORT),
            jwt_secret: get(JWT_SECRET_ENV),
            data_dir: get(DATA_DIR_ENV).map(PathBuf::from),
            request_timeout: Duration::from_secs(parse_or(
                get(REQUEST_TIMEOUT_ENV),
                REQUEST_TIMEOUT_ENV,
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            hash_params: HashParams {
                memory_kib: parse_or(get(ARGON2_MEMORY_ENV), ARGON2_MEMORY_ENV, defaults.memory_kib),
                iterations: parse_or(
                    get(ARGON2_ITERATIONS_ENV),
                    ARGON2_ITERATIONS_ENV,
                    defaults.iterations,
                ),
                parallelism: parse_or(
                    get(ARGON2_PARALLELISM_ENV),
                    ARGON2_PARALLELISM_ENV,
                    defaults.parallelism,
                ),
                key_len: defaults.key_len,
            },
            tls,
            log_format,
        }
    }

    /// `host:port` as configured.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(
    value: Option<String>,
    name: &str,
    default: T,
) -> T {
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("{name}={raw:?} is not valid; using default {default}");
            default
        }),
    }
}
