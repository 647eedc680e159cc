// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Custodia

use std::sync::Arc;

use redb::Database;

use crate::auth::{ApiKeyStore, SessionIssuer};
use crate::ledger::Ledger;
use crate::providers::PaystackClient;

/// Shared application state.
///
/// The ledger and the API-key store share one redb database; redb handles
/// its own locking, so no additional synchronization wraps it.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub api_keys: ApiKeyStore,
    pub sessions: SessionIssuer,
    pub gateway: Option<Arc<PaystackClient>>,
}

impl AppState {
    pub fn new(db: Arc<Database>, sessions: SessionIssuer) -> Self {
        Self {
            ledger: Ledger::new(Arc::clone(&db)),
            api_keys: ApiKeyStore::new(db),
            sessions,
            gateway: None,
        }
    }

    pub fn with_gateway(mut self, gateway: PaystackClient) -> Self {
        self.gateway = Some(Arc::new(gateway));
        self
    }
}
