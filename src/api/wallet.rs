// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! Wallet endpoints: balance, deposits, transfers, transaction history.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use crate::auth::RequirePermission;
use crate::error::ApiError;
use crate::models::{
    BalanceResponse, DepositRequest, DepositResponse, DepositStatusResponse, Permission,
    TransactionRecord, TransferRequest, TransferResponse,
};
use crate::state::AppState;

/// Minimum deposit or transfer amount in minor units.
const MIN_AMOUNT: u64 = 100;

/// Characters of the wallet id embedded in a deposit reference.
const REFERENCE_WALLET_PREFIX_LEN: usize = 8;

/// Get the caller's wallet balance.
#[utoipa::path(
    get,
    path = "/wallet/balance",
    tag = "Wallet",
    security(("bearer" = []), ("api_key" = [])),
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "API key lacks the read permission"),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn get_balance(
    RequirePermission(caller): RequirePermission<{ Permission::Read as u8 }>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let wallet = state.ledger.wallet_for_user(&caller.user_id)?;
    Ok(Json(BalanceResponse {
        balance: wallet.balance_minor,
    }))
}

/// Start a deposit: record the pending transaction and open a hosted
/// payment session at the gateway.
#[utoipa::path(
    post,
    path = "/wallet/deposit",
    tag = "Wallet",
    security(("bearer" = []), ("api_key" = [])),
    request_body = DepositRequest,
    responses(
        (status = 200, description = "Hosted payment session created", body = DepositResponse),
        (status = 400, description = "Invalid amount"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "API key lacks the deposit permission"),
        (status = 503, description = "Payment gateway not configured")
    )
)]
pub async fn deposit(
    RequirePermission(caller): RequirePermission<{ Permission::Deposit as u8 }>,
    State(state): State<AppState>,
    Json(payload): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, ApiError> {
    if payload.amount < MIN_AMOUNT {
        return Err(ApiError::bad_request(format!(
            "Minimum deposit amount is {MIN_AMOUNT}"
        )));
    }

    let gateway = state
        .gateway
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Payment gateway is not configured"))?;

    let wallet = state.ledger.wallet_for_user(&caller.user_id)?;
    let reference = format!(
        "dep_{}_{}",
        Utc::now().timestamp(),
        &wallet.id[..REFERENCE_WALLET_PREFIX_LEN]
    );

    state
        .ledger
        .record_deposit_intent(&wallet.id, payload.amount, &reference)?;

    let authorization_url = gateway
        .initialize_transaction(&caller.email, payload.amount, &reference)
        .await?;

    Ok(Json(DepositResponse {
        reference,
        authorization_url,
    }))
}

/// Transfer funds to another wallet by its 13-digit number.
#[utoipa::path(
    post,
    path = "/wallet/transfer",
    tag = "Wallet",
    security(("bearer" = []), ("api_key" = [])),
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer completed", body = TransferResponse),
        (status = 400, description = "Invalid input, insufficient balance, or self-transfer"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "API key lacks the transfer permission"),
        (status = 404, description = "Sender or recipient wallet not found")
    )
)]
pub async fn transfer(
    RequirePermission(caller): RequirePermission<{ Permission::Transfer as u8 }>,
    State(state): State<AppState>,
    Json(payload): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    if payload.wallet_number.len() != 13
        || !payload.wallet_number.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ApiError::bad_request(
            "Wallet number must be exactly 13 digits",
        ));
    }
    if payload.amount < MIN_AMOUNT {
        return Err(ApiError::bad_request(format!(
            "Minimum transfer amount is {MIN_AMOUNT}"
        )));
    }

    let result = state
        .ledger
        .transfer(&caller.user_id, &payload.wallet_number, payload.amount)?;

    Ok(Json(TransferResponse {
        status: "success".to_string(),
        message: "Transfer completed".to_string(),
        transaction_id: result.transaction_id,
    }))
}

/// List the caller's transactions, newest first.
#[utoipa::path(
    get,
    path = "/wallet/transactions",
    tag = "Wallet",
    security(("bearer" = []), ("api_key" = [])),
    responses(
        (status = 200, description = "Transaction history", body = [TransactionRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "API key lacks the read permission"),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn get_transactions(
    RequirePermission(caller): RequirePermission<{ Permission::Read as u8 }>,
    State(state): State<AppState>,
) -> Result<Json<Vec<TransactionRecord>>, ApiError> {
    let wallet = state.ledger.wallet_for_user(&caller.user_id)?;
    let transactions = state.ledger.transactions_for_wallet(&wallet.id)?;
    Ok(Json(transactions))
}

/// Deposit status by reference. Public: the reference itself is the
/// capability, handed out only to the depositor.
#[utoipa::path(
    get,
    path = "/wallet/deposit/{reference}/status",
    tag = "Wallet",
    params(("reference" = String, Path, description = "Deposit reference")),
    responses(
        (status = 200, description = "Deposit status", body = DepositStatusResponse),
        (status = 404, description = "Unknown reference")
    )
)]
pub async fn get_deposit_status(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<DepositStatusResponse>, ApiError> {
    let record = state.ledger.deposit_status(&reference)?;
    Ok(Json(DepositStatusResponse {
        reference,
        status: record.status,
        amount: record.amount_minor,
    }))
}
