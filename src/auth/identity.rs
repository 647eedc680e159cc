// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! Verified caller identity.
//!
//! Both credential paths (session token, API key) resolve to the same
//! [`CallerIdentity`] shape, so downstream ledger handlers never care which
//! kind of credential authenticated the request. New credential kinds slot
//! in as new [`CredentialKind`] variants without touching the ledger.

use serde::{Deserialize, Serialize};

use crate::models::Permission;

/// Which credential authenticated the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CredentialKind {
    /// Signed short-lived session token; fully privileged over the caller's
    /// own resources
    Session,
    /// Long-lived API key scoped to an explicit permission set
    ApiKey { permissions: Vec<Permission> },
}

/// The authenticated caller attached to a request.
///
/// Never built from client-supplied data; only the verifiers in this module
/// construct it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub user_id: String,
    pub email: String,
    pub credential: CredentialKind,
}

impl CallerIdentity {
    pub fn session(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            credential: CredentialKind::Session,
        }
    }

    pub fn api_key(
        user_id: impl Into<String>,
        email: impl Into<String>,
        permissions: Vec<Permission>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            credential: CredentialKind::ApiKey { permissions },
        }
    }

    /// Permission check per the access decision table: session callers are
    /// treated as fully privileged; API-key callers must hold the permission.
    pub fn has_permission(&self, required: Permission) -> bool {
        match &self.credential {
            CredentialKind::Session => true,
            CredentialKind::ApiKey { permissions } => permissions.contains(&required),
        }
    }

    /// The permissions held by an API-key caller, for error reporting.
    pub fn held_permissions(&self) -> Vec<Permission> {
        match &self.credential {
            CredentialKind::Session => Vec::new(),
            CredentialKind::ApiKey { permissions } => permissions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_callers_hold_every_permission() {
        let caller = CallerIdentity::session("user-1", "a@example.com");
        assert!(caller.has_permission(Permission::Read));
        assert!(caller.has_permission(Permission::Deposit));
        assert!(caller.has_permission(Permission::Transfer));
    }

    #[test]
    fn api_key_callers_are_scoped() {
        let caller =
            CallerIdentity::api_key("user-1", "a@example.com", vec![Permission::Read]);
        assert!(caller.has_permission(Permission::Read));
        assert!(!caller.has_permission(Permission::Transfer));
        assert_eq!(caller.held_permissions(), vec![Permission::Read]);
    }
}
