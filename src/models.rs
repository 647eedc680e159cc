// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! # Data Models
//!
//! Domain records persisted by the ledger plus the request and response
//! structures used by the REST API. All types derive `Serialize`,
//! `Deserialize`, and `ToSchema` for automatic JSON handling and OpenAPI
//! documentation.
//!
//! ## Money
//!
//! Every amount in this crate is an **integer number of minor currency
//! units** (`u64`). Balance arithmetic uses checked integer operations;
//! floating point never touches a balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Permissions
// =============================================================================

/// Capability tag carried by an API key.
///
/// Gates which ledger operations a key may invoke. Session-token callers
/// are not permission-scoped; they are fully privileged over their own
/// resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Permission {
    Read = 0,
    Deposit = 1,
    Transfer = 2,
}

impl Permission {
    /// Decode the `u8` discriminant used by the const-generic extractor.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Permission::Read),
            1 => Some(Permission::Deposit),
            2 => Some(Permission::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Permission::Read => "read",
            Permission::Deposit => "deposit",
            Permission::Transfer => "transfer",
        };
        write!(f, "{name}")
    }
}

// =============================================================================
// Ledger Records
// =============================================================================

/// A user provisioned on first identity-provider login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRecord {
    /// Unique user identifier (UUID)
    pub id: String,
    /// Email asserted by the identity provider
    pub email: String,
    /// Stable identifier from the external identity provider
    pub provider_user_id: String,
    /// When the user was created
    pub created_at: DateTime<Utc>,
}

/// A custodial wallet. Exactly one per user, created with the user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletRecord {
    /// Unique wallet identifier (UUID)
    pub id: String,
    /// Owning user
    pub owner_user_id: String,
    /// Public 13-digit wallet number
    pub wallet_number: String,
    /// Balance in minor currency units
    pub balance_minor: u64,
    /// When the wallet was created
    pub created_at: DateTime<Utc>,
}

/// Kind of a ledger-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Transfer,
}

/// Transaction lifecycle state.
///
/// `Pending` deposits move to exactly one of the terminal states and never
/// revert. Transfers are created directly as `Success` because the funds
/// movement and the record are one atomic step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    /// Terminal states admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }
}

/// One immutable-once-terminal ledger event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionRecord {
    /// Unique transaction identifier (UUID)
    pub id: String,
    /// Wallet the event is attributed to (sender's wallet for transfers)
    pub wallet_id: String,
    pub kind: TransactionKind,
    /// Amount in minor currency units
    pub amount_minor: u64,
    pub status: TransactionStatus,
    /// Idempotency key for gateway-confirmed deposits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Receiving wallet for transfers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_wallet_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A permission-scoped API key. Only the bcrypt hash of the key is stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyRecord {
    /// Unique key identifier (UUID)
    pub id: String,
    /// Owning user
    pub owner_user_id: String,
    /// Human-readable label chosen at creation
    pub name: String,
    /// bcrypt hash of the plaintext key (the plaintext is never persisted)
    pub key_hash: String,
    pub permissions: Vec<Permission>,
    pub expires_at: DateTime<Utc>,
    /// Monotone: once revoked, a key stays revoked
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Auth API
// =============================================================================

/// Verified assertion handed over by the external identity provider after a
/// successful third-party login.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct IdentityCallbackRequest {
    /// Stable user identifier at the identity provider
    pub provider_user_id: String,
    pub email: String,
}

/// Summary of the logged-in user returned with a fresh session token.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginUser {
    pub id: String,
    pub email: String,
    pub wallet_number: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Signed session token for the `Authorization: Bearer` header
    pub access_token: String,
    pub user: LoginUser,
}

// =============================================================================
// Wallet API
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    /// Balance in minor currency units
    pub balance: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositRequest {
    /// Amount to deposit in minor currency units
    pub amount: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepositResponse {
    /// Idempotency reference correlating the gateway confirmation
    pub reference: String,
    /// Hosted payment page to redirect the user to
    pub authorization_url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferRequest {
    /// Recipient wallet number, exactly 13 ASCII digits
    pub wallet_number: String,
    /// Amount to transfer in minor currency units
    pub amount: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferResponse {
    pub status: String,
    pub message: String,
    pub transaction_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepositStatusResponse {
    pub reference: String,
    pub status: TransactionStatus,
    /// Amount in minor currency units
    pub amount: u64,
}

// =============================================================================
// API-Key API
// =============================================================================

/// Expiry preset for a new API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum KeyExpiry {
    #[serde(rename = "1H")]
    OneHour,
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "1Y")]
    OneYear,
}

impl KeyExpiry {
    pub fn duration(self) -> chrono::Duration {
        match self {
            KeyExpiry::OneHour => chrono::Duration::hours(1),
            KeyExpiry::OneDay => chrono::Duration::days(1),
            KeyExpiry::OneMonth => chrono::Duration::days(30),
            KeyExpiry::OneYear => chrono::Duration::days(365),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateApiKeyRequest {
    /// Label for the key, 3 to 100 characters
    pub name: String,
    /// Permissions granted to the key; must not be empty
    pub permissions: Vec<Permission>,
    pub expiry: KeyExpiry,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RolloverApiKeyRequest {
    /// Identifier of the expired key to roll over
    pub expired_key_id: String,
    pub expiry: KeyExpiry,
}

/// The one and only time the plaintext key is ever shown.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyResponse {
    pub api_key: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevokeResponse {
    pub message: String,
}
