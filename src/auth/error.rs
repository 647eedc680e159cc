// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! Authentication and authorization errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::Permission;

/// Credential verification and permission-check failures.
#[derive(Debug)]
pub enum AuthError {
    /// Neither an API key nor a bearer token was presented
    MissingCredential,
    /// Authorization header present but not `Bearer <token>`
    InvalidAuthHeader,
    /// Session token is malformed
    MalformedToken,
    /// Session token signature is invalid
    InvalidSignature,
    /// Session token has expired
    TokenExpired,
    /// Presented API key matches no active key
    InvalidApiKey,
    /// Matched API key is past its expiry
    ApiKeyExpired(DateTime<Utc>),
    /// Endpoint accepts session tokens only
    SessionRequired,
    /// API key lacks the permission the operation declares
    MissingPermission {
        required: Permission,
        held: Vec<Permission>,
    },
    /// Internal error during credential verification
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidApiKey => "invalid_api_key",
            AuthError::ApiKeyExpired(_) => "api_key_expired",
            AuthError::SessionRequired => "session_required",
            AuthError::MissingPermission { .. } => "missing_permission",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredential
            | AuthError::InvalidAuthHeader
            | AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::InvalidApiKey
            | AuthError::ApiKeyExpired(_)
            | AuthError::SessionRequired => StatusCode::UNAUTHORIZED,
            AuthError::MissingPermission { .. } => StatusCode::FORBIDDEN,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingCredential => write!(
                f,
                "Credential required: provide an API key in the 'x-api-key' header \
                 or a session token in the Authorization header"
            ),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::MalformedToken => write!(f, "Token is malformed"),
            AuthError::InvalidSignature => write!(f, "Token signature is invalid"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::InvalidApiKey => write!(f, "Invalid API key"),
            AuthError::ApiKeyExpired(expired_at) => write!(
                f,
                "API key expired on {}. Use the rollover endpoint to create a new key",
                expired_at.to_rfc3339()
            ),
            AuthError::SessionRequired => {
                write!(f, "This operation requires a session token, not an API key")
            }
            AuthError::MissingPermission { required, held } => {
                let held = held
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "API key lacks required permission: {required}. Current permissions: {held}"
                )
            }
            AuthError::InternalError(msg) => {
                write!(f, "Internal authentication error: {msg}")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
