// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! Embedded ledger database backed by redb (pure Rust, ACID).
//!
//! All durable state lives in one redb file. redb serializes write
//! transactions, which is the sole concurrency-correctness mechanism for
//! balance mutations: every ledger operation that touches money runs inside
//! a single `begin_write()` .. `commit()` unit.
//!
//! ## Table Layout
//!
//! - `users`: user_id → serialized UserRecord
//! - `users_by_provider`: provider_user_id → user_id
//! - `wallets`: wallet_id → serialized WalletRecord
//! - `wallets_by_owner`: user_id → wallet_id
//! - `wallets_by_number`: wallet_number → wallet_id
//! - `transactions`: tx_id → serialized TransactionRecord
//! - `transactions_by_reference`: reference → tx_id
//! - `wallet_tx_index`: composite key (wallet_id|!timestamp|tx_id) → tx_id
//! - `api_keys`: key_id → serialized ApiKeyRecord

use std::path::Path;

use redb::{Database, TableDefinition};

// =============================================================================
// Table Definitions
// =============================================================================

/// user_id → UserRecord (JSON bytes).
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Identity-provider id → user_id.
pub const USERS_BY_PROVIDER: TableDefinition<&str, &str> =
    TableDefinition::new("users_by_provider");

/// wallet_id → WalletRecord (JSON bytes).
pub const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");

/// user_id → wallet_id. One wallet per user.
pub const WALLETS_BY_OWNER: TableDefinition<&str, &str> =
    TableDefinition::new("wallets_by_owner");

/// Public 13-digit wallet number → wallet_id.
pub const WALLETS_BY_NUMBER: TableDefinition<&str, &str> =
    TableDefinition::new("wallets_by_number");

/// tx_id → TransactionRecord (JSON bytes).
pub const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");

/// Deposit reference → tx_id. Enforces reference uniqueness.
pub const TRANSACTIONS_BY_REFERENCE: TableDefinition<&str, &str> =
    TableDefinition::new("transactions_by_reference");

/// Index: composite key → tx_id.
/// Key format: `wallet_id|!timestamp_be|tx_id` for newest-first range scans.
pub const WALLET_TX_INDEX: TableDefinition<&[u8], &str> =
    TableDefinition::new("wallet_tx_index");

/// key_id → ApiKeyRecord (JSON bytes).
pub const API_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("api_keys");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb database error: {0}")]
    Database(#[from] redb::DatabaseError),

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
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Database Open
// =============================================================================

/// Open (or create) the ledger database at the given path.
///
/// Pre-creates all tables so later read transactions don't fail on a
/// fresh database.
pub fn open_database(path: &Path) -> StoreResult<Database> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let db = Database::create(path)?;

    let write_txn = db.begin_write()?;
    {
        let _ = write_txn.open_table(USERS)?;
        let _ = write_txn.open_table(USERS_BY_PROVIDER)?;
        let _ = write_txn.open_table(WALLETS)?;
        let _ = write_txn.open_table(WALLETS_BY_OWNER)?;
        let _ = write_txn.open_table(WALLETS_BY_NUMBER)?;
        let _ = write_txn.open_table(TRANSACTIONS)?;
        let _ = write_txn.open_table(TRANSACTIONS_BY_REFERENCE)?;
        let _ = write_txn.open_table(WALLET_TX_INDEX)?;
        let _ = write_txn.open_table(API_KEYS)?;
    }
    write_txn.commit()?;

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::ReadableDatabase;

    #[test]
    fn open_precreates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_database(&dir.path().join("test.redb")).unwrap();

        // A read transaction on a fresh database must find every table.
        let read_txn = db.begin_read().unwrap();
        assert!(read_txn.open_table(USERS).is_ok());
        assert!(read_txn.open_table(WALLETS).is_ok());
        assert!(read_txn.open_table(TRANSACTIONS).is_ok());
        assert!(read_txn.open_table(API_KEYS).is_ok());
    }

    #[test]
    fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested/deeper/test.redb");
        assert!(open_database(&nested).is_ok());
        assert!(nested.exists());
    }
}
