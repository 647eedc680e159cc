// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the ledger database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `SESSION_SECRET` | HS256 signing secret for session tokens | Required |
//! | `SESSION_TTL_SECS` | Session token lifetime in seconds | `604800` (7 days) |
//! | `PAYSTACK_SECRET_KEY` | Gateway secret (API auth + webhook MAC) | Required for deposits |
//! | `PAYSTACK_BASE_URL` | Gateway API base URL | `https://api.paystack.co` |
//! | `APP_URL` | Public base URL for payment callback redirects | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;

/// Environment variable name for the ledger data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// File name of the redb database inside the data directory.
pub const DATABASE_FILE: &str = "custodia.redb";

/// Default session token lifetime: 7 days.
const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Configuration resolved from the environment at startup.
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    pub session_secret: String,
    pub session_ttl: chrono::Duration,
}

impl AppConfig {
    /// Load configuration, failing fast on a missing session secret.
    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| "PORT must be a valid port number".to_string())?;
        let data_dir = env::var(DATA_DIR_ENV).unwrap_or_else(|_| "/data".to_string());

        let session_secret = env::var("SESSION_SECRET")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| "SESSION_SECRET must be set".to_string())?;

        let ttl_secs: i64 = match env::var("SESSION_TTL_SECS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| "SESSION_TTL_SECS must be a number of seconds".to_string())?,
            Err(_) => DEFAULT_SESSION_TTL_SECS,
        };

        Ok(Self {
            host,
            port,
            data_dir,
            session_secret,
            session_ttl: chrono::Duration::seconds(ttl_secs),
        })
    }
}
