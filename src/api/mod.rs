// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    api::health::HealthResponse,
    models::{
        ApiKeyResponse, BalanceResponse, CreateApiKeyRequest, DepositRequest, DepositResponse,
        DepositStatusResponse, IdentityCallbackRequest, KeyExpiry, LoginResponse, LoginUser,
        Permission, RevokeResponse, RolloverApiKeyRequest, TransactionKind, TransactionRecord,
        TransactionStatus, TransferRequest, TransferResponse,
    },
    state::AppState,
};

pub mod auth;
pub mod health;
pub mod keys;
pub mod wallet;
pub mod webhook;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/auth/callback", post(auth::identity_callback))
        .route("/wallet/balance", get(wallet::get_balance))
        .route("/wallet/deposit", post(wallet::deposit))
        .route("/wallet/transfer", post(wallet::transfer))
        .route("/wallet/transactions", get(wallet::get_transactions))
        .route(
            "/wallet/deposit/{reference}/status",
            get(wallet::get_deposit_status),
        )
        .route("/wallet/paystack/webhook", post(webhook::paystack_webhook))
        .route("/keys", post(keys::create_key))
        .route("/keys/rollover", post(keys::rollover_key))
        .route("/keys/{key_id}/revoke", delete(keys::revoke_key))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::identity_callback,
        wallet::get_balance,
        wallet::deposit,
        wallet::transfer,
        wallet::get_transactions,
        wallet::get_deposit_status,
        webhook::paystack_webhook,
        keys::create_key,
        keys::rollover_key,
        keys::revoke_key
    ),
    components(
        schemas(
            HealthResponse,
            IdentityCallbackRequest,
            LoginResponse,
            LoginUser,
            BalanceResponse,
            DepositRequest,
            DepositResponse,
            DepositStatusResponse,
            TransferRequest,
            TransferResponse,
            TransactionRecord,
            TransactionKind,
            TransactionStatus,
            Permission,
            KeyExpiry,
            CreateApiKeyRequest,
            RolloverApiKeyRequest,
            ApiKeyResponse,
            RevokeResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Auth", description = "Login and session issuance"),
        (name = "Wallet", description = "Balances, deposits, and transfers"),
        (name = "Webhook", description = "Payment gateway notifications"),
        (name = "API Keys", description = "Permission-scoped credential management")
    )
)]
struct ApiDoc;
