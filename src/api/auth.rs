// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! Identity-provider callback.
//!
//! The OAuth redirect dance happens upstream; by the time this endpoint is
//! invoked the transport layer has verified the third-party assertion and
//! hands over a stable provider user id plus email. First login provisions
//! the user and their wallet; every login returns a fresh session token.

use axum::{extract::State, Json};

use crate::error::ApiError;
use crate::models::{IdentityCallbackRequest, LoginResponse, LoginUser};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/auth/callback",
    tag = "Auth",
    request_body = IdentityCallbackRequest,
    responses(
        (status = 200, description = "Session token issued", body = LoginResponse),
        (status = 400, description = "Invalid assertion payload")
    )
)]
pub async fn identity_callback(
    State(state): State<AppState>,
    Json(payload): Json<IdentityCallbackRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if payload.provider_user_id.trim().is_empty() {
        return Err(ApiError::bad_request("provider_user_id must not be empty"));
    }
    if !payload.email.contains('@') {
        return Err(ApiError::bad_request("email must be a valid address"));
    }

    let (user, wallet) = state
        .ledger
        .resolve_or_create_user(&payload.provider_user_id, &payload.email)?;

    let access_token = state
        .sessions
        .issue(&user)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(LoginResponse {
        access_token,
        user: LoginUser {
            id: user.id,
            email: user.email,
            wallet_number: wallet.wallet_number,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ApiKeyStore, SessionIssuer};
    use crate::ledger::Ledger;
    use crate::storage::open_database;
    use std::sync::Arc;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(open_database(&dir.path().join("test.redb")).unwrap());
        let state = AppState {
            ledger: Ledger::new(Arc::clone(&db)),
            api_keys: ApiKeyStore::new(db).with_cost(4),
            sessions: SessionIssuer::new(b"test-secret", chrono::Duration::days(7)),
            gateway: None,
        };
        (state, dir)
    }

    #[tokio::test]
    async fn callback_provisions_and_returns_token() {
        let (state, _dir) = test_state();
        let response = identity_callback(
            State(state.clone()),
            Json(IdentityCallbackRequest {
                provider_user_id: "google-123".into(),
                email: "alice@example.com".into(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.0.user.email, "alice@example.com");
        assert_eq!(response.0.user.wallet_number.len(), 13);

        // The token verifies back to the same user.
        let caller = state.sessions.verify(&response.0.access_token).unwrap();
        assert_eq!(caller.user_id, response.0.user.id);
    }

    #[tokio::test]
    async fn callback_rejects_bad_payloads() {
        let (state, _dir) = test_state();

        let err = identity_callback(
            State(state.clone()),
            Json(IdentityCallbackRequest {
                provider_user_id: "  ".into(),
                email: "alice@example.com".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);

        let err = identity_callback(
            State(state),
            Json(IdentityCallbackRequest {
                provider_user_id: "google-123".into(),
                email: "not-an-email".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }
}
