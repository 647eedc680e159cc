// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::ApiKeyError;
use crate::ledger::LedgerError;
use crate::providers::PaystackError;
use crate::storage::StoreError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::Validation(_) | LedgerError::InvalidOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            LedgerError::InsufficientFunds => StatusCode::BAD_REQUEST,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Conflict(_) => StatusCode::CONFLICT,
            _ => {
                tracing::error!(error = %err, "ledger storage failure");
                return Self::internal("Internal server error");
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<ApiKeyError> for ApiError {
    fn from(err: ApiKeyError) -> Self {
        let status = match &err {
            ApiKeyError::QuotaExceeded => StatusCode::FORBIDDEN,
            ApiKeyError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiKeyError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => {
                tracing::error!(error = %err, "api key storage failure");
                return Self::internal("Internal server error");
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "storage failure");
        Self::internal("Internal server error")
    }
}

impl From<PaystackError> for ApiError {
    fn from(err: PaystackError) -> Self {
        match &err {
            PaystackError::MissingConfig(_) => {
                tracing::error!(error = %err, "payment gateway not configured");
                Self::service_unavailable("Payment gateway is not configured")
            }
            _ => Self::bad_gateway(err.to_string()),
        }
    }
}
