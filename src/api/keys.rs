// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! API-key management endpoints.
//!
//! All three operations require a session token; an API key can never mint
//! or revoke other keys.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::auth::SessionAuth;
use crate::error::ApiError;
use crate::models::{
    ApiKeyResponse, CreateApiKeyRequest, RevokeResponse, RolloverApiKeyRequest,
};
use crate::state::AppState;

/// Create a new API key. Maximum 5 active keys per user.
#[utoipa::path(
    post,
    path = "/keys",
    tag = "API Keys",
    security(("bearer" = [])),
    request_body = CreateApiKeyRequest,
    responses(
        (status = 201, description = "API key created; plaintext shown this once", body = ApiKeyResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Maximum 5 active keys reached")
    )
)]
pub async fn create_key(
    SessionAuth(caller): SessionAuth,
    State(state): State<AppState>,
    Json(payload): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyResponse>), ApiError> {
    let name = payload.name.trim();
    if name.len() < 3 || name.len() > 100 {
        return Err(ApiError::bad_request(
            "Name must be between 3 and 100 characters",
        ));
    }
    if payload.permissions.is_empty() {
        return Err(ApiError::bad_request("Permissions must not be empty"));
    }

    let issued = state
        .api_keys
        .issue(&caller.user_id, name, payload.permissions, payload.expiry)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyResponse {
            api_key: issued.plaintext,
            expires_at: issued.expires_at,
        }),
    ))
}

/// Roll an expired key over into a fresh one with the same name and
/// permissions.
#[utoipa::path(
    post,
    path = "/keys/rollover",
    tag = "API Keys",
    security(("bearer" = [])),
    request_body = RolloverApiKeyRequest,
    responses(
        (status = 201, description = "Replacement key created", body = ApiKeyResponse),
        (status = 400, description = "Key is not expired yet"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Maximum 5 active keys reached"),
        (status = 404, description = "Key not found")
    )
)]
pub async fn rollover_key(
    SessionAuth(caller): SessionAuth,
    State(state): State<AppState>,
    Json(payload): Json<RolloverApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyResponse>), ApiError> {
    let issued = state.api_keys.rollover(
        &caller.user_id,
        &payload.expired_key_id,
        payload.expiry,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyResponse {
            api_key: issued.plaintext,
            expires_at: issued.expires_at,
        }),
    ))
}

/// Permanently revoke a key. Cannot be undone.
#[utoipa::path(
    delete,
    path = "/keys/{key_id}/revoke",
    tag = "API Keys",
    security(("bearer" = [])),
    params(("key_id" = String, Path, description = "Identifier of the key to revoke")),
    responses(
        (status = 200, description = "API key revoked", body = RevokeResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Key not found")
    )
)]
pub async fn revoke_key(
    SessionAuth(caller): SessionAuth,
    State(state): State<AppState>,
    Path(key_id): Path<String>,
) -> Result<Json<RevokeResponse>, ApiError> {
    state.api_keys.revoke(&caller.user_id, &key_id)?;
    Ok(Json(RevokeResponse {
        message: "API key revoked successfully".to_string(),
    }))
}
