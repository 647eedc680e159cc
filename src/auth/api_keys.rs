// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

//! API key issuance, rollover, revocation, and verification.
//!
//! Only a bcrypt hash of each key is ever persisted, so authentication
//! cannot use an index lookup: it scans every non-revoked key and runs the
//! (intentionally slow) hash verification against each candidate. That
//! O(active-keys) cost is the accepted trade-off for never storing anything
//! derivable into the plaintext. A fingerprint-narrowed two-phase lookup is
//! the known scaling escape hatch.
//!
//! Quota: at most 5 non-revoked keys per user. The count check and the
//! insert share one write transaction; redb serializes writers, so the
//! check-then-act race of the relational ancestry does not exist here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::RngCore;
use redb::{Database, ReadableDatabase, ReadableTable};
use uuid::Uuid;

use super::{AuthError, CallerIdentity};
use crate::models::{ApiKeyRecord, KeyExpiry, Permission, UserRecord};
use crate::storage::{API_KEYS, USERS};

/// Maximum non-revoked keys per user.
const MAX_ACTIVE_KEYS: usize = 5;

/// Bytes of randomness behind each key (256 bits).
const KEY_MATERIAL_LEN: usize = 32;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiKeyError {
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

    #[error("key hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Maximum 5 active API keys allowed per user. Revoke one first")]
    QuotaExceeded,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),
}

pub type ApiKeyResult<T> = Result<T, ApiKeyError>;

/// The plaintext key and its expiry, returned exactly once at issuance.
#[derive(Debug)]
pub struct IssuedKey {
    pub plaintext: String,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// ApiKeyStore
// =============================================================================

/// Persists hashed API keys and their permission scopes.
#[derive(Clone)]
pub struct ApiKeyStore {
    db: Arc<Database>,
    bcrypt_cost: u32,
}

impl ApiKeyStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Override the bcrypt cost factor. Tests lower it to keep the
    /// hash-scan fast; production keeps the slow default.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Issue a new key for a user.
    ///
    /// The returned plaintext is shown once and never again retrievable.
    pub fn issue(
        &self,
        user_id: &str,
        name: &str,
        permissions: Vec<Permission>,
        expiry: KeyExpiry,
    ) -> ApiKeyResult<IssuedKey> {
        let write_txn = self.db.begin_write()?;
        let issued = {
            let mut keys = write_txn.open_table(API_KEYS)?;

            if count_active(&keys, user_id)? >= MAX_ACTIVE_KEYS {
                return Err(ApiKeyError::QuotaExceeded);
            }

            let plaintext = generate_key();
            let expires_at = Utc::now() + expiry.duration();
            let record = ApiKeyRecord {
                id: Uuid::new_v4().to_string(),
                owner_user_id: user_id.to_string(),
                name: name.to_string(),
                key_hash: bcrypt::hash(&plaintext, self.bcrypt_cost)?,
                permissions,
                expires_at,
                is_revoked: false,
                created_at: Utc::now(),
            };
            keys.insert(record.id.as_str(), serde_json::to_vec(&record)?.as_slice())?;

            tracing::info!(key_id = %record.id, user_id, "issued API key");
            IssuedKey {
                plaintext,
                expires_at,
            }
        };
        write_txn.commit()?;
        Ok(issued)
    }

    /// Replace a truly expired key with a fresh one carrying the same name
    /// and permission set. The old key is not revoked.
    pub fn rollover(
        &self,
        user_id: &str,
        expired_key_id: &str,
        expiry: KeyExpiry,
    ) -> ApiKeyResult<IssuedKey> {
        let write_txn = self.db.begin_write()?;
        let issued = {
            let mut keys = write_txn.open_table(API_KEYS)?;

            let expired: ApiKeyRecord = {
                let bytes = keys
                    .get(expired_key_id)?
                    .ok_or_else(|| ApiKeyError::NotFound("API key not found".to_string()))?;
                serde_json::from_slice(bytes.value())?
            };
            if expired.owner_user_id != user_id {
                return Err(ApiKeyError::NotFound("API key not found".to_string()));
            }
            if expired.expires_at > Utc::now() {
                return Err(ApiKeyError::Validation(
                    "API key is not expired yet".to_string(),
                ));
            }

            if count_active(&keys, user_id)? >= MAX_ACTIVE_KEYS {
                return Err(ApiKeyError::QuotaExceeded);
            }

            let plaintext = generate_key();
            let expires_at = Utc::now() + expiry.duration();
            let record = ApiKeyRecord {
                id: Uuid::new_v4().to_string(),
                owner_user_id: user_id.to_string(),
                name: expired.name,
                key_hash: bcrypt::hash(&plaintext, self.bcrypt_cost)?,
                permissions: expired.permissions,
                expires_at,
                is_revoked: false,
                created_at: Utc::now(),
            };
            keys.insert(record.id.as_str(), serde_json::to_vec(&record)?.as_slice())?;

            tracing::info!(
                old_key_id = expired_key_id,
                new_key_id = %record.id,
                "rolled over API key"
            );
            IssuedKey {
                plaintext,
                expires_at,
            }
        };
        write_txn.commit()?;
        Ok(issued)
    }

    /// Permanently revoke a key. Revocation is monotone; revoking an
    /// already-revoked key is a no-op.
    pub fn revoke(&self, user_id: &str, key_id: &str) -> ApiKeyResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut keys = write_txn.open_table(API_KEYS)?;
            let mut record: ApiKeyRecord = {
                let bytes = keys
                    .get(key_id)?
                    .ok_or_else(|| ApiKeyError::NotFound("API key not found".to_string()))?;
                serde_json::from_slice(bytes.value())?
            };
            if record.owner_user_id != user_id {
                return Err(ApiKeyError::NotFound("API key not found".to_string()));
            }
            record.is_revoked = true;
            keys.insert(key_id, serde_json::to_vec(&record)?.as_slice())?;
        }
        write_txn.commit()?;
        tracing::info!(key_id, user_id, "revoked API key");
        Ok(())
    }

    /// Authenticate a presented plaintext key.
    ///
    /// Scans every non-revoked key and runs the slow hash verification
    /// against each until one matches; expiry is checked only after a match
    /// so an attacker learns nothing about which keys exist.
    pub fn authenticate(&self, presented: &str) -> Result<CallerIdentity, AuthError> {
        let read_txn = self.db.begin_read().map_err(internal)?;
        let keys = read_txn.open_table(API_KEYS).map_err(internal)?;

        let mut matched: Option<ApiKeyRecord> = None;
        for entry in keys.iter().map_err(internal)? {
            let entry = entry.map_err(internal)?;
            let record: ApiKeyRecord =
                serde_json::from_slice(entry.1.value()).map_err(internal)?;
            if record.is_revoked {
                continue;
            }
            if bcrypt::verify(presented, &record.key_hash).unwrap_or(false) {
                matched = Some(record);
                break;
            }
        }

        let record = matched.ok_or(AuthError::InvalidApiKey)?;

        if record.expires_at < Utc::now() {
            return Err(AuthError::ApiKeyExpired(record.expires_at));
        }

        let users = read_txn.open_table(USERS).map_err(internal)?;
        let user: UserRecord = {
            let bytes = users
                .get(record.owner_user_id.as_str())
                .map_err(internal)?
                .ok_or_else(|| {
                    AuthError::InternalError("API key owner no longer exists".to_string())
                })?;
            serde_json::from_slice(bytes.value()).map_err(internal)?
        };

        Ok(CallerIdentity::api_key(
            user.id,
            user.email,
            record.permissions,
        ))
    }
}

fn internal(err: impl std::fmt::Display) -> AuthError {
    AuthError::InternalError(err.to_string())
}

/// Count a user's non-revoked keys.
fn count_active(
    keys: &impl ReadableTable<&'static str, &'static [u8]>,
    user_id: &str,
) -> ApiKeyResult<usize> {
    let mut count = 0;
    for entry in keys.iter()? {
        let entry = entry?;
        let record: ApiKeyRecord = serde_json::from_slice(entry.1.value())?;
        if record.owner_user_id == user_id && !record.is_revoked {
            count += 1;
        }
    }
    Ok(count)
}

/// High-entropy random key rendered as a prefixed hex string.
fn generate_key() -> String {
    let mut material = [0u8; KEY_MATERIAL_LEN];
    rand::thread_rng().fill_bytes(&mut material);
    format!("sk_live_{}", hex::encode(material))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialKind;
    use crate::ledger::Ledger;
    use crate::storage::open_database;

    /// Low bcrypt cost keeps the hash-scan tests fast.
    const TEST_COST: u32 = 4;

    fn temp_store() -> (ApiKeyStore, Ledger, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(open_database(&dir.path().join("test.redb")).unwrap());
        (
            ApiKeyStore::new(Arc::clone(&db)).with_cost(TEST_COST),
            Ledger::new(db),
            dir,
        )
    }

    fn seeded_user(ledger: &Ledger) -> UserRecord {
        ledger
            .resolve_or_create_user("google-123", "alice@example.com")
            .unwrap()
            .0
    }

    #[test]
    fn generated_keys_are_prefixed_hex() {
        let key = generate_key();
        assert!(key.starts_with("sk_live_"));
        assert_eq!(key.len(), "sk_live_".len() + KEY_MATERIAL_LEN * 2);
        assert!(key["sk_live_".len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn issued_key_authenticates_with_its_permissions() {
        let (store, ledger, _dir) = temp_store();
        let user = seeded_user(&ledger);

        let issued = store
            .issue(
                &user.id,
                "ci",
                vec![Permission::Read, Permission::Transfer],
                KeyExpiry::OneDay,
            )
            .unwrap();

        let caller = store.authenticate(&issued.plaintext).unwrap();
        assert_eq!(caller.user_id, user.id);
        assert_eq!(caller.email, "alice@example.com");
        match caller.credential {
            CredentialKind::ApiKey { permissions } => {
                assert_eq!(permissions, vec![Permission::Read, Permission::Transfer]);
            }
            CredentialKind::Session => panic!("expected api key credential"),
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        let (store, _ledger, _dir) = temp_store();
        assert!(matches!(
            store.authenticate("sk_live_deadbeef"),
            Err(AuthError::InvalidApiKey)
        ));
    }

    #[test]
    fn revoked_key_no_longer_authenticates() {
        let (store, ledger, _dir) = temp_store();
        let user = seeded_user(&ledger);

        let issued = store
            .issue(&user.id, "ci", vec![Permission::Read], KeyExpiry::OneDay)
            .unwrap();
        let caller = store.authenticate(&issued.plaintext).unwrap();

        // Find the key id through a second issuance-free path: revoke needs
        // the id, which the caller tracks out of band; here we scan.
        let key_id = {
            let read_txn = store.db.begin_read().unwrap();
            let keys = read_txn.open_table(API_KEYS).unwrap();
            let entry = keys.iter().unwrap().next().unwrap().unwrap();
            let record: ApiKeyRecord = serde_json::from_slice(entry.1.value()).unwrap();
            record.id
        };

        store.revoke(&caller.user_id, &key_id).unwrap();
        assert!(matches!(
            store.authenticate(&issued.plaintext),
            Err(AuthError::InvalidApiKey)
        ));

        // Idempotent by effect.
        store.revoke(&caller.user_id, &key_id).unwrap();
    }

    #[test]
    fn revoke_rejects_missing_and_foreign_keys() {
        let (store, ledger, _dir) = temp_store();
        let user = seeded_user(&ledger);
        let issued = store
            .issue(&user.id, "ci", vec![Permission::Read], KeyExpiry::OneDay)
            .unwrap();
        let _ = issued;

        assert!(matches!(
            store.revoke(&user.id, "no-such-key"),
            Err(ApiKeyError::NotFound(_))
        ));

        let key_id = {
            let read_txn = store.db.begin_read().unwrap();
            let keys = read_txn.open_table(API_KEYS).unwrap();
            let entry = keys.iter().unwrap().next().unwrap().unwrap();
            let record: ApiKeyRecord = serde_json::from_slice(entry.1.value()).unwrap();
            record.id
        };
        assert!(matches!(
            store.revoke("someone-else", &key_id),
            Err(ApiKeyError::NotFound(_))
        ));
    }

    #[test]
    fn expired_key_is_rejected_with_rollover_hint() {
        let (store, ledger, _dir) = temp_store();
        let user = seeded_user(&ledger);

        let issued = store
            .issue(&user.id, "ci", vec![Permission::Read], KeyExpiry::OneHour)
            .unwrap();

        // Backdate the stored expiry.
        let key_id = {
            let write_txn = store.db.begin_write().unwrap();
            let id = {
                let mut keys = write_txn.open_table(API_KEYS).unwrap();
                let mut record: ApiKeyRecord = {
                    let entry = keys.iter().unwrap().next().unwrap().unwrap();
                    serde_json::from_slice(entry.1.value()).unwrap()
                };
                record.expires_at = Utc::now() - chrono::Duration::hours(1);
                keys.insert(record.id.as_str(), serde_json::to_vec(&record).unwrap().as_slice())
                    .unwrap();
                record.id
            };
            write_txn.commit().unwrap();
            id
        };

        match store.authenticate(&issued.plaintext) {
            Err(AuthError::ApiKeyExpired(_)) => {}
            other => panic!("expected expired-key rejection, got {other:?}"),
        }

        // An expired key is exactly what rollover accepts.
        let rolled = store
            .rollover(&user.id, &key_id, KeyExpiry::OneDay)
            .unwrap();
        let caller = store.authenticate(&rolled.plaintext).unwrap();
        assert_eq!(caller.user_id, user.id);
    }

    #[test]
    fn rollover_rejects_unexpired_and_foreign_keys() {
        let (store, ledger, _dir) = temp_store();
        let user = seeded_user(&ledger);
        store
            .issue(&user.id, "ci", vec![Permission::Read], KeyExpiry::OneDay)
            .unwrap();

        let key_id = {
            let read_txn = store.db.begin_read().unwrap();
            let keys = read_txn.open_table(API_KEYS).unwrap();
            let entry = keys.iter().unwrap().next().unwrap().unwrap();
            let record: ApiKeyRecord = serde_json::from_slice(entry.1.value()).unwrap();
            record.id
        };

        assert!(matches!(
            store.rollover(&user.id, &key_id, KeyExpiry::OneDay),
            Err(ApiKeyError::Validation(_))
        ));
        assert!(matches!(
            store.rollover("someone-else", &key_id, KeyExpiry::OneDay),
            Err(ApiKeyError::NotFound(_))
        ));
        assert!(matches!(
            store.rollover(&user.id, "no-such-key", KeyExpiry::OneDay),
            Err(ApiKeyError::NotFound(_))
        ));
    }

    #[test]
    fn rollover_inherits_name_and_permissions() {
        let (store, ledger, _dir) = temp_store();
        let user = seeded_user(&ledger);
        store
            .issue(
                &user.id,
                "deploy-bot",
                vec![Permission::Deposit],
                KeyExpiry::OneHour,
            )
            .unwrap();

        let key_id = {
            let write_txn = store.db.begin_write().unwrap();
            let id = {
                let mut keys = write_txn.open_table(API_KEYS).unwrap();
                let mut record: ApiKeyRecord = {
                    let entry = keys.iter().unwrap().next().unwrap().unwrap();
                    serde_json::from_slice(entry.1.value()).unwrap()
                };
                record.expires_at = Utc::now() - chrono::Duration::hours(1);
                keys.insert(record.id.as_str(), serde_json::to_vec(&record).unwrap().as_slice())
                    .unwrap();
                record.id
            };
            write_txn.commit().unwrap();
            id
        };

        let rolled = store
            .rollover(&user.id, &key_id, KeyExpiry::OneDay)
            .unwrap();
        let caller = store.authenticate(&rolled.plaintext).unwrap();
        assert_eq!(caller.held_permissions(), vec![Permission::Deposit]);

        // The old record is untouched: still present, still not revoked.
        let read_txn = store.db.begin_read().unwrap();
        let keys = read_txn.open_table(API_KEYS).unwrap();
        let old: ApiKeyRecord =
            serde_json::from_slice(keys.get(key_id.as_str()).unwrap().unwrap().value()).unwrap();
        assert!(!old.is_revoked);
        assert_eq!(old.name, "deploy-bot");
    }

    #[test]
    fn sixth_active_key_exceeds_quota_until_one_is_revoked() {
        let (store, ledger, _dir) = temp_store();
        let user = seeded_user(&ledger);

        for i in 0..MAX_ACTIVE_KEYS {
            store
                .issue(
                    &user.id,
                    &format!("key-{i}"),
                    vec![Permission::Read],
                    KeyExpiry::OneDay,
                )
                .unwrap();
        }

        assert!(matches!(
            store.issue(&user.id, "one-too-many", vec![Permission::Read], KeyExpiry::OneDay),
            Err(ApiKeyError::QuotaExceeded)
        ));

        let key_id = {
            let read_txn = store.db.begin_read().unwrap();
            let keys = read_txn.open_table(API_KEYS).unwrap();
            let entry = keys.iter().unwrap().next().unwrap().unwrap();
            let record: ApiKeyRecord = serde_json::from_slice(entry.1.value()).unwrap();
            record.id
        };
        store.revoke(&user.id, &key_id).unwrap();

        assert!(store
            .issue(&user.id, "replacement", vec![Permission::Read], KeyExpiry::OneDay)
            .is_ok());
    }

    #[test]
    fn quota_is_per_user() {
        let (store, ledger, _dir) = temp_store();
        let alice = seeded_user(&ledger);
        let bob = ledger
            .resolve_or_create_user("google-456", "bob@example.com")
            .unwrap()
            .0;

        for i in 0..MAX_ACTIVE_KEYS {
            store
                .issue(&alice.id, &format!("key-{i}"), vec![Permission::Read], KeyExpiry::OneDay)
                .unwrap();
        }

        // Alice's full quota does not block Bob.
        assert!(store
            .issue(&bob.id, "bobs-key", vec![Permission::Read], KeyExpiry::OneDay)
            .is_ok());
    }
}
