// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! Payment reconciliation: the gateway's asynchronous notification.
//!
//! The signature is computed over the **raw received bytes**, never a
//! re-serialized form, so the body is taken as `Bytes` and parsed only
//! after verification succeeds. Unrecognized event types are acknowledged
//! with 200 and ignored; the gateway delivers at-least-once and must not
//! be provoked into retrying events we will never handle.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::providers::SIGNATURE_HEADER;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    event: String,
    #[serde(default)]
    data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookData {
    reference: Option<String>,
    /// Amount in minor currency units
    amount: Option<u64>,
    status: Option<String>,
}

/// Gateway notification endpoint.
#[utoipa::path(
    post,
    path = "/wallet/paystack/webhook",
    tag = "Webhook",
    request_body = Value,
    responses(
        (status = 200, description = "Notification processed or ignored"),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Missing or invalid signature"),
        (status = 404, description = "Unknown deposit reference"),
        (status = 503, description = "Payment gateway not configured")
    )
)]
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let gateway = state
        .gateway
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Payment gateway is not configured"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("No signature provided"))?;

    if !gateway.verify_webhook_signature(&body, signature) {
        tracing::warn!("webhook rejected: invalid signature");
        return Err(ApiError::unauthorized("Invalid signature"));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("Invalid webhook payload"))?;

    match payload.event.as_str() {
        "charge.success" => {
            let reference = payload
                .data
                .reference
                .ok_or_else(|| ApiError::bad_request("Missing reference"))?;
            let amount = payload
                .data
                .amount
                .ok_or_else(|| ApiError::bad_request("Missing amount"))?;
            let status = payload
                .data
                .status
                .ok_or_else(|| ApiError::bad_request("Missing status"))?;

            state
                .ledger
                .credit_on_confirmation(&reference, amount, &status)?;
            tracing::info!(%reference, "webhook confirmation applied");
        }
        other => {
            tracing::debug!(event = other, "ignored webhook event");
        }
    }

    Ok(Json(json!({ "status": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ApiKeyStore, SessionIssuer};
    use crate::ledger::Ledger;
    use crate::models::TransactionStatus;
    use crate::providers::PaystackClient;
    use crate::storage::open_database;
    use hmac::{Hmac, Mac};
    use sha2::Sha512;
    use std::sync::Arc;

    const SECRET: &str = "sk_test_webhook_secret";

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(open_database(&dir.path().join("test.redb")).unwrap());
        let gateway = PaystackClient::new(
            "http://localhost:1".to_string(),
            SECRET.to_string(),
            None,
        )
        .unwrap();
        let state = AppState {
            ledger: Ledger::new(Arc::clone(&db)),
            api_keys: ApiKeyStore::new(db).with_cost(4),
            sessions: SessionIssuer::new(b"test-secret", chrono::Duration::days(7)),
            gateway: Some(Arc::new(gateway)),
        };
        (state, dir)
    }

    fn signed_headers(body: &[u8]) -> HeaderMap {
        let mut mac = Hmac::<Sha512>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, signature.parse().unwrap());
        headers
    }

    fn pending_deposit(state: &AppState, reference: &str, amount: u64) -> String {
        let (user, wallet) = state
            .ledger
            .resolve_or_create_user("g-1", "a@example.com")
            .unwrap();
        state
            .ledger
            .record_deposit_intent(&wallet.id, amount, reference)
            .unwrap();
        user.id
    }

    fn charge_success_body(reference: &str, amount: u64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "event": "charge.success",
            "data": { "reference": reference, "amount": amount, "status": "success" }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn confirmed_charge_credits_wallet_once() {
        let (state, _dir) = test_state();
        let user_id = pending_deposit(&state, "dep_1", 5000);

        let body = charge_success_body("dep_1", 5000);
        let headers = signed_headers(&body);

        paystack_webhook(
            State(state.clone()),
            headers.clone(),
            Bytes::from(body.clone()),
        )
        .await
        .unwrap();
        assert_eq!(
            state.ledger.wallet_for_user(&user_id).unwrap().balance_minor,
            5000
        );
        assert_eq!(
            state.ledger.deposit_status("dep_1").unwrap().status,
            TransactionStatus::Success
        );

        // At-least-once delivery: the duplicate must not double-credit.
        paystack_webhook(State(state.clone()), headers, Bytes::from(body))
            .await
            .unwrap();
        assert_eq!(
            state.ledger.wallet_for_user(&user_id).unwrap().balance_minor,
            5000
        );
    }

    #[tokio::test]
    async fn failed_charge_marks_transaction_failed() {
        let (state, _dir) = test_state();
        let user_id = pending_deposit(&state, "dep_1", 5000);

        let body = serde_json::to_vec(&json!({
            "event": "charge.success",
            "data": { "reference": "dep_1", "amount": 5000, "status": "abandoned" }
        }))
        .unwrap();
        let headers = signed_headers(&body);

        paystack_webhook(State(state.clone()), headers, Bytes::from(body))
            .await
            .unwrap();
        assert_eq!(
            state.ledger.wallet_for_user(&user_id).unwrap().balance_minor,
            0
        );
        assert_eq!(
            state.ledger.deposit_status("dep_1").unwrap().status,
            TransactionStatus::Failed
        );
    }

    #[tokio::test]
    async fn invalid_signature_is_rejected_without_ledger_effect() {
        let (state, _dir) = test_state();
        let user_id = pending_deposit(&state, "dep_1", 5000);

        let body = charge_success_body("dep_1", 5000);
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, "deadbeef".parse().unwrap());

        let err = paystack_webhook(State(state.clone()), headers, Bytes::from(body))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(
            state.ledger.wallet_for_user(&user_id).unwrap().balance_minor,
            0
        );
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let (state, _dir) = test_state();
        let body = charge_success_body("dep_1", 5000);

        let err = paystack_webhook(State(state), HeaderMap::new(), Bytes::from(body))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn tampered_body_fails_signature_check() {
        let (state, _dir) = test_state();
        pending_deposit(&state, "dep_1", 5000);

        let body = charge_success_body("dep_1", 5000);
        let headers = signed_headers(&body);
        let tampered = charge_success_body("dep_1", 999_999);

        let err = paystack_webhook(State(state), headers, Bytes::from(tampered))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_event_is_acknowledged_and_ignored() {
        let (state, _dir) = test_state();
        let user_id = pending_deposit(&state, "dep_1", 5000);

        let body = serde_json::to_vec(&json!({
            "event": "subscription.create",
            "data": {}
        }))
        .unwrap();
        let headers = signed_headers(&body);

        let response = paystack_webhook(State(state.clone()), headers, Bytes::from(body))
            .await
            .unwrap();
        assert_eq!(response.0["status"], true);
        assert_eq!(
            state.ledger.wallet_for_user(&user_id).unwrap().balance_minor,
            0
        );
    }

    #[tokio::test]
    async fn unknown_reference_is_not_found() {
        let (state, _dir) = test_state();

        let body = charge_success_body("dep_unknown", 5000);
        let headers = signed_headers(&body);

        let err = paystack_webhook(State(state), headers, Bytes::from(body))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }
}
