// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

use std::{env, net::SocketAddr, path::Path, sync::Arc};

use tracing_subscriber::EnvFilter;

use custodia_server::{
    api::router,
    auth::SessionIssuer,
    config::{AppConfig, DATABASE_FILE},
    providers::PaystackClient,
    state::AppState,
    storage::open_database,
};

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("configuration error: {message}");
            std::process::exit(1);
        }
    };

    let db_path = Path::new(&config.data_dir).join(DATABASE_FILE);
    let db = match open_database(&db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            eprintln!("failed to open ledger database at {}: {e}", db_path.display());
            std::process::exit(1);
        }
    };

    let sessions = SessionIssuer::new(config.session_secret.as_bytes(), config.session_ttl);
    let mut state = AppState::new(db, sessions);

    if PaystackClient::is_configured() {
        match PaystackClient::from_env() {
            Ok(gateway) => {
                tracing::info!("payment gateway configured");
                state = state.with_gateway(gateway);
            }
            Err(e) => {
                eprintln!("failed to configure payment gateway: {e}");
                std::process::exit(1);
            }
        }
    } else {
        tracing::warn!("PAYSTACK_SECRET_KEY not set; deposits are disabled");
    }

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");

    tracing::info!(%addr, "Custodia server listening (docs at /docs)");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = env::var("LOG_FORMAT").map_or(false, |v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install ctrl-c handler");
    tracing::info!("shutdown signal received");
}
