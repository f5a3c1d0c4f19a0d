// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Tracing initialization.
//!
//! `RUST_LOG` controls the filter; unset, [`DEFAULT_LOG_FILTER`] applies.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, DEFAULT_LOG_FILTER};
use crate::server::ServerError;

fn env_filter() -> Result<EnvFilter, ServerError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .map_err(|e| ServerError::Tracing(e.to_string()))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(format: LogFormat) -> Result<(), ServerError> {
    let filter = env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_level(true))
            .try_init(),
    };

    result.map_err(|e| ServerError::Tracing(e.to_string()))
}
