// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! Axum extractors for authenticated callers.
//!
//! Use the `Auth` extractor in handlers to require a credential:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(caller): Auth) -> impl IntoResponse {
//!     // caller is CallerIdentity
//! }
//! ```
//!
//! Use `RequirePermission` when the operation declares a permission:
//!
//! ```rust,ignore
//! async fn transfer(
//!     RequirePermission(caller): RequirePermission<{ Permission::Transfer as u8 }>,
//! ) -> impl IntoResponse {
//!     // session callers always pass; API-key callers need the permission
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, CallerIdentity, CredentialKind};
use crate::models::Permission;
use crate::state::AppState;

/// Dedicated request header for API keys.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Extractor resolving either credential kind to a verified caller.
///
/// The `x-api-key` header wins when both credentials are present; a request
/// with neither is rejected.
pub struct Auth(pub CallerIdentity);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Middleware or tests may have resolved the caller already.
        if let Some(caller) = parts.extensions.get::<CallerIdentity>().cloned() {
            return Ok(Auth(caller));
        }

        if let Some(value) = parts.headers.get(API_KEY_HEADER) {
            let presented = value.to_str().map_err(|_| AuthError::InvalidApiKey)?;
            let caller = state.api_keys.authenticate(presented)?;
            return Ok(Auth(caller));
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingCredential)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let caller = state.sessions.verify(token.trim())?;
        Ok(Auth(caller))
    }
}

/// Extractor that accepts session tokens only.
///
/// Credential management endpoints refuse API keys; a key must never be able
/// to mint or revoke other keys.
pub struct SessionAuth(pub CallerIdentity);

impl FromRequestParts<AppState> for SessionAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Auth(caller) = Auth::from_request_parts(parts, state).await?;
        match caller.credential {
            CredentialKind::Session => Ok(SessionAuth(caller)),
            CredentialKind::ApiKey { .. } => Err(AuthError::SessionRequired),
        }
    }
}

/// Extractor that enforces a declared permission.
///
/// Session callers skip the check; API-key callers lacking the permission
/// are rejected with a message enumerating missing and held permissions.
pub struct RequirePermission<const P: u8>(pub CallerIdentity);

impl<const P: u8> FromRequestParts<AppState> for RequirePermission<P> {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Auth(caller) = Auth::from_request_parts(parts, state).await?;

        let required = Permission::from_code(P)
            .ok_or_else(|| AuthError::InternalError(format!("invalid permission code {P}")))?;

        if !caller.has_permission(required) {
            return Err(AuthError::MissingPermission {
                required,
                held: caller.held_permissions(),
            });
        }

        Ok(RequirePermission(caller))
    }
}
