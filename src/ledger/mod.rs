// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! Transactional ledger: wallet balances and the transaction log.
//!
//! Every mutating operation here is one redb write transaction. redb
//! serializes writers, so a transfer's read-modify-write of two balances
//! plus its transaction insert commit or abort as a unit; two concurrent
//! transfers touching the same wallet cannot interleave into a lost update
//! or a negative balance.
//!
//! Transaction lifecycle: deposits are inserted `Pending` and move to
//! `Success` or `Failed` exactly once when the gateway confirms. Transfers
//! are inserted directly as `Success` in the same write transaction as the
//! balance movement.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use redb::{Database, ReadableDatabase, ReadableTable};
use uuid::Uuid;

use crate::models::{
    TransactionKind, TransactionRecord, TransactionStatus, UserRecord, WalletRecord,
};
use crate::storage::{
    TRANSACTIONS, TRANSACTIONS_BY_REFERENCE, USERS, USERS_BY_PROVIDER, WALLETS,
    WALLETS_BY_NUMBER, WALLETS_BY_OWNER, WALLET_TX_INDEX,
};

/// Attempts to draw an unused 13-digit wallet number before giving up.
const WALLET_NUMBER_ATTEMPTS: usize = 8;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("redb transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Insufficient balance")]
    InsufficientFunds,

    #[error("{0}")]
    InvalidOperation(String),

    #[error("{0}")]
    Conflict(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Outcome of a committed transfer.
#[derive(Debug, Clone)]
pub struct TransferResult {
    pub transaction_id: String,
    pub status: TransactionStatus,
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key for the wallet_tx_index table.
///
/// Format: `wallet_id | inverted_timestamp_be_bytes | tx_id`
///
/// The inverted millisecond timestamp ensures newest-first ordering when
/// scanning forward.
fn make_index_key(wallet_id: &str, timestamp_millis: i64, tx_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(wallet_id.len() + 1 + 8 + 1 + tx_id.len());
    key.extend_from_slice(wallet_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!timestamp_millis as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(tx_id.as_bytes());
    key
}

/// Build a prefix key for range scanning all transactions of a wallet.
fn make_prefix(wallet_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(wallet_id.len() + 1);
    prefix.extend_from_slice(wallet_id.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Build the upper bound for a range scan (prefix with 0xFF bytes appended).
fn make_prefix_end(wallet_id: &str) -> Vec<u8> {
    let mut end = Vec::with_capacity(wallet_id.len() + 1 + 20);
    end.extend_from_slice(wallet_id.as_bytes());
    end.push(b'|');
    end.extend_from_slice(&[0xFF; 20]);
    end
}

/// Draw a uniform-random 13-digit wallet number.
fn generate_wallet_number() -> String {
    rand::thread_rng()
        .gen_range(1_000_000_000_000u64..10_000_000_000_000u64)
        .to_string()
}

// =============================================================================
// Ledger
// =============================================================================

/// Owns wallet balances and the transaction log.
#[derive(Clone)]
pub struct Ledger {
    db: Arc<Database>,
}

impl Ledger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Users & Wallets
    // =========================================================================

    /// Resolve an identity-provider assertion to a user, provisioning the
    /// user and their wallet on first login.
    ///
    /// User and wallet are created in the same write transaction; a user can
    /// never exist without a wallet.
    pub fn resolve_or_create_user(
        &self,
        provider_user_id: &str,
        email: &str,
    ) -> LedgerResult<(UserRecord, WalletRecord)> {
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut users = write_txn.open_table(USERS)?;
            let mut users_by_provider = write_txn.open_table(USERS_BY_PROVIDER)?;
            let mut wallets = write_txn.open_table(WALLETS)?;
            let mut wallets_by_owner = write_txn.open_table(WALLETS_BY_OWNER)?;
            let mut wallets_by_number = write_txn.open_table(WALLETS_BY_NUMBER)?;

            let existing_user_id = users_by_provider
                .get(provider_user_id)?
                .map(|guard| guard.value().to_string());

            if let Some(user_id) = existing_user_id {
                let user: UserRecord = {
                    let bytes = users
                        .get(user_id.as_str())?
                        .ok_or_else(|| LedgerError::NotFound("User not found".to_string()))?;
                    serde_json::from_slice(bytes.value())?
                };
                let wallet_id = wallets_by_owner
                    .get(user_id.as_str())?
                    .map(|guard| guard.value().to_string())
                    .ok_or_else(|| LedgerError::NotFound("Wallet not found".to_string()))?;
                let wallet: WalletRecord = {
                    let bytes = wallets
                        .get(wallet_id.as_str())?
                        .ok_or_else(|| LedgerError::NotFound("Wallet not found".to_string()))?;
                    serde_json::from_slice(bytes.value())?
                };
                (user, wallet)
            } else {
                let now = Utc::now();
                let user = UserRecord {
                    id: Uuid::new_v4().to_string(),
                    email: email.to_string(),
                    provider_user_id: provider_user_id.to_string(),
                    created_at: now,
                };

                // Uniform-random draw with a bounded retry against the
                // number index. See DESIGN.md on wallet-number uniqueness.
                let mut wallet_number = None;
                for _ in 0..WALLET_NUMBER_ATTEMPTS {
                    let candidate = generate_wallet_number();
                    if wallets_by_number.get(candidate.as_str())?.is_none() {
                        wallet_number = Some(candidate);
                        break;
                    }
                }
                let wallet_number = wallet_number.ok_or_else(|| {
                    LedgerError::Conflict(
                        "Could not allocate a unique wallet number".to_string(),
                    )
                })?;

                let wallet = WalletRecord {
                    id: Uuid::new_v4().to_string(),
                    owner_user_id: user.id.clone(),
                    wallet_number,
                    balance_minor: 0,
                    created_at: now,
                };

                users.insert(user.id.as_str(), serde_json::to_vec(&user)?.as_slice())?;
                users_by_provider.insert(provider_user_id, user.id.as_str())?;
                wallets.insert(wallet.id.as_str(), serde_json::to_vec(&wallet)?.as_slice())?;
                wallets_by_owner.insert(user.id.as_str(), wallet.id.as_str())?;
                wallets_by_number.insert(wallet.wallet_number.as_str(), wallet.id.as_str())?;

                tracing::info!(user_id = %user.id, "provisioned user and wallet");
                (user, wallet)
            }
        };
        write_txn.commit()?;
        Ok(result)
    }

    /// Look up a user by id.
    pub fn user(&self, user_id: &str) -> LedgerResult<UserRecord> {
        let read_txn = self.db.begin_read()?;
        let users = read_txn.open_table(USERS)?;
        let bytes = users
            .get(user_id)?
            .ok_or_else(|| LedgerError::NotFound("User not found".to_string()))?;
        Ok(serde_json::from_slice(bytes.value())?)
    }

    /// Look up the wallet owned by a user.
    pub fn wallet_for_user(&self, user_id: &str) -> LedgerResult<WalletRecord> {
        let read_txn = self.db.begin_read()?;
        let wallets_by_owner = read_txn.open_table(WALLETS_BY_OWNER)?;
        let wallet_id = wallets_by_owner
            .get(user_id)?
            .map(|guard| guard.value().to_string())
            .ok_or_else(|| LedgerError::NotFound("Wallet not found".to_string()))?;
        let wallets = read_txn.open_table(WALLETS)?;
        let bytes = wallets
            .get(wallet_id.as_str())?
            .ok_or_else(|| LedgerError::NotFound("Wallet not found".to_string()))?;
        Ok(serde_json::from_slice(bytes.value())?)
    }

    /// Look up a wallet by its public 13-digit number.
    pub fn wallet_by_number(&self, wallet_number: &str) -> LedgerResult<WalletRecord> {
        let read_txn = self.db.begin_read()?;
        let wallets_by_number = read_txn.open_table(WALLETS_BY_NUMBER)?;
        let wallet_id = wallets_by_number
            .get(wallet_number)?
            .map(|guard| guard.value().to_string())
            .ok_or_else(|| LedgerError::NotFound("Wallet not found".to_string()))?;
        let wallets = read_txn.open_table(WALLETS)?;
        let bytes = wallets
            .get(wallet_id.as_str())?
            .ok_or_else(|| LedgerError::NotFound("Wallet not found".to_string()))?;
        Ok(serde_json::from_slice(bytes.value())?)
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Record a deposit intent as a `Pending` transaction.
    ///
    /// Does not touch the balance; the credit happens when the gateway
    /// confirms via [`Ledger::credit_on_confirmation`].
    pub fn record_deposit_intent(
        &self,
        wallet_id: &str,
        amount_minor: u64,
        reference: &str,
    ) -> LedgerResult<TransactionRecord> {
        if amount_minor == 0 {
            return Err(LedgerError::Validation(
                "Amount must be greater than zero".to_string(),
            ));
        }

        let write_txn = self.db.begin_write()?;
        let record = {
            let wallets = write_txn.open_table(WALLETS)?;
            if wallets.get(wallet_id)?.is_none() {
                return Err(LedgerError::NotFound("Wallet not found".to_string()));
            }
            drop(wallets);

            let mut by_reference = write_txn.open_table(TRANSACTIONS_BY_REFERENCE)?;
            if by_reference.get(reference)?.is_some() {
                return Err(LedgerError::Conflict(format!(
                    "Reference {reference} already exists"
                )));
            }

            let record = TransactionRecord {
                id: Uuid::new_v4().to_string(),
                wallet_id: wallet_id.to_string(),
                kind: TransactionKind::Deposit,
                amount_minor,
                status: TransactionStatus::Pending,
                reference: Some(reference.to_string()),
                recipient_wallet_id: None,
                created_at: Utc::now(),
            };

            let mut transactions = write_txn.open_table(TRANSACTIONS)?;
            transactions.insert(record.id.as_str(), serde_json::to_vec(&record)?.as_slice())?;
            by_reference.insert(reference, record.id.as_str())?;

            let mut index = write_txn.open_table(WALLET_TX_INDEX)?;
            let key = make_index_key(wallet_id, record.created_at.timestamp_millis(), &record.id);
            index.insert(key.as_slice(), record.id.as_str())?;

            record
        };
        write_txn.commit()?;
        Ok(record)
    }

    /// Apply a gateway confirmation to the transaction identified by
    /// `reference`.
    ///
    /// Idempotent: an already-terminal transaction is left untouched, so a
    /// duplicated notification can never double-credit. On a `success`
    /// status the balance update and the status flip commit atomically; any
    /// other status marks the transaction `Failed` and leaves the balance
    /// alone.
    pub fn credit_on_confirmation(
        &self,
        reference: &str,
        amount_confirmed_minor: u64,
        gateway_status: &str,
    ) -> LedgerResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let by_reference = write_txn.open_table(TRANSACTIONS_BY_REFERENCE)?;
            let tx_id = by_reference
                .get(reference)?
                .map(|guard| guard.value().to_string())
                .ok_or_else(|| LedgerError::NotFound("Transaction not found".to_string()))?;
            drop(by_reference);

            let mut transactions = write_txn.open_table(TRANSACTIONS)?;
            let mut record: TransactionRecord = {
                let bytes = transactions
                    .get(tx_id.as_str())?
                    .ok_or_else(|| LedgerError::NotFound("Transaction not found".to_string()))?;
                serde_json::from_slice(bytes.value())?
            };

            if record.status.is_terminal() {
                // Duplicate delivery; dropping the transaction aborts it.
                tracing::info!(reference, "confirmation for terminal transaction ignored");
                return Ok(());
            }

            if gateway_status == "success" {
                let mut wallets = write_txn.open_table(WALLETS)?;
                let mut wallet: WalletRecord = {
                    let bytes = wallets
                        .get(record.wallet_id.as_str())?
                        .ok_or_else(|| LedgerError::NotFound("Wallet not found".to_string()))?;
                    serde_json::from_slice(bytes.value())?
                };
                wallet.balance_minor = wallet
                    .balance_minor
                    .checked_add(amount_confirmed_minor)
                    .ok_or_else(|| {
                        LedgerError::Validation("Balance would overflow".to_string())
                    })?;
                wallets.insert(wallet.id.as_str(), serde_json::to_vec(&wallet)?.as_slice())?;

                record.status = TransactionStatus::Success;
                record.amount_minor = amount_confirmed_minor;
                tracing::info!(reference, amount = amount_confirmed_minor, "deposit credited");
            } else {
                record.status = TransactionStatus::Failed;
                tracing::warn!(reference, gateway_status, "deposit marked failed");
            }

            transactions.insert(tx_id.as_str(), serde_json::to_vec(&record)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Deposit status lookup by reference.
    pub fn deposit_status(&self, reference: &str) -> LedgerResult<TransactionRecord> {
        let read_txn = self.db.begin_read()?;
        let by_reference = read_txn.open_table(TRANSACTIONS_BY_REFERENCE)?;
        let tx_id = by_reference
            .get(reference)?
            .map(|guard| guard.value().to_string())
            .ok_or_else(|| LedgerError::NotFound("Transaction not found".to_string()))?;
        let transactions = read_txn.open_table(TRANSACTIONS)?;
        let bytes = transactions
            .get(tx_id.as_str())?
            .ok_or_else(|| LedgerError::NotFound("Transaction not found".to_string()))?;
        Ok(serde_json::from_slice(bytes.value())?)
    }

    // =========================================================================
    // Transfer
    // =========================================================================

    /// Move funds between two wallets, all-or-nothing.
    ///
    /// Debit, credit and the `Success` transfer row commit in one write
    /// transaction; on any failure nothing is visible. The row is attributed
    /// to the sender's wallet and carries the recipient wallet id.
    pub fn transfer(
        &self,
        sender_user_id: &str,
        recipient_wallet_number: &str,
        amount_minor: u64,
    ) -> LedgerResult<TransferResult> {
        // Re-validated here even though the handler checks it upstream.
        if amount_minor == 0 {
            return Err(LedgerError::Validation(
                "Amount must be greater than zero".to_string(),
            ));
        }

        let write_txn = self.db.begin_write()?;
        let result = {
            let wallets_by_owner = write_txn.open_table(WALLETS_BY_OWNER)?;
            let sender_id = wallets_by_owner
                .get(sender_user_id)?
                .map(|guard| guard.value().to_string())
                .ok_or_else(|| LedgerError::NotFound("Sender wallet not found".to_string()))?;
            drop(wallets_by_owner);

            let mut wallets = write_txn.open_table(WALLETS)?;
            let mut sender: WalletRecord = {
                let bytes = wallets
                    .get(sender_id.as_str())?
                    .ok_or_else(|| LedgerError::NotFound("Sender wallet not found".to_string()))?;
                serde_json::from_slice(bytes.value())?
            };

            if sender.balance_minor < amount_minor {
                return Err(LedgerError::InsufficientFunds);
            }

            let wallets_by_number = write_txn.open_table(WALLETS_BY_NUMBER)?;
            let recipient_id = wallets_by_number
                .get(recipient_wallet_number)?
                .map(|guard| guard.value().to_string())
                .ok_or_else(|| {
                    LedgerError::NotFound("Recipient wallet not found".to_string())
                })?;
            drop(wallets_by_number);

            if sender.id == recipient_id {
                return Err(LedgerError::InvalidOperation(
                    "Cannot transfer to your own wallet".to_string(),
                ));
            }

            let mut recipient: WalletRecord = {
                let bytes = wallets.get(recipient_id.as_str())?.ok_or_else(|| {
                    LedgerError::NotFound("Recipient wallet not found".to_string())
                })?;
                serde_json::from_slice(bytes.value())?
            };

            // Checked on both sides; an overflow aborts the whole unit.
            sender.balance_minor = sender
                .balance_minor
                .checked_sub(amount_minor)
                .ok_or(LedgerError::InsufficientFunds)?;
            recipient.balance_minor = recipient
                .balance_minor
                .checked_add(amount_minor)
                .ok_or_else(|| {
                    LedgerError::Validation("Recipient balance would overflow".to_string())
                })?;

            wallets.insert(sender.id.as_str(), serde_json::to_vec(&sender)?.as_slice())?;
            wallets.insert(
                recipient.id.as_str(),
                serde_json::to_vec(&recipient)?.as_slice(),
            )?;

            let record = TransactionRecord {
                id: Uuid::new_v4().to_string(),
                wallet_id: sender.id.clone(),
                kind: TransactionKind::Transfer,
                amount_minor,
                status: TransactionStatus::Success,
                reference: None,
                recipient_wallet_id: Some(recipient.id.clone()),
                created_at: Utc::now(),
            };

            let mut transactions = write_txn.open_table(TRANSACTIONS)?;
            transactions.insert(record.id.as_str(), serde_json::to_vec(&record)?.as_slice())?;

            let mut index = write_txn.open_table(WALLET_TX_INDEX)?;
            let key =
                make_index_key(&sender.id, record.created_at.timestamp_millis(), &record.id);
            index.insert(key.as_slice(), record.id.as_str())?;

            tracing::info!(
                transaction_id = %record.id,
                amount = amount_minor,
                "transfer committed"
            );

            TransferResult {
                transaction_id: record.id,
                status: TransactionStatus::Success,
            }
        };
        write_txn.commit()?;
        Ok(result)
    }

    // =========================================================================
    // Listings
    // =========================================================================

    /// All transactions attributed to a wallet, newest first.
    pub fn transactions_for_wallet(
        &self,
        wallet_id: &str,
    ) -> LedgerResult<Vec<TransactionRecord>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(WALLET_TX_INDEX)?;
        let transactions = read_txn.open_table(TRANSACTIONS)?;

        let prefix = make_prefix(wallet_id);
        let prefix_end = make_prefix_end(wallet_id);

        let mut results = Vec::new();
        for entry in index.range(prefix.as_slice()..prefix_end.as_slice())? {
            let entry = entry?;
            let tx_id = entry.1.value().to_string();
            if let Some(bytes) = transactions.get(tx_id.as_str())? {
                let record: TransactionRecord = serde_json::from_slice(bytes.value())?;
                results.push(record);
            }
        }
        Ok(results)
    }
}

// =============================================================================
// Tests
// =============================================================================
