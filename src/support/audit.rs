use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::Actor;
use crate::platform::{Order, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const TABLE: &str = "support_audit_log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

/// Append-only record of a support-account mutation, with opaque before and
/// after snapshots. `account_id` is the all-zero uuid when the subject row
/// did not exist yet at write time (creation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub action: AuditAction,
    pub actor_id: Uuid,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Best-effort audit writer. Audit is advisory, not transactional: a failed
/// write is logged and swallowed, never blocking the primary operation.
pub struct AuditRecorder {
    rows: Arc<dyn RowStore>,
}

impl AuditRecorder {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            rows: Arc::clone(&state.rows),
        }
    }

    pub async fn record(
        &self,
        action: AuditAction,
        account_id: Uuid,
        actor: &Actor,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            account_id,
            action,
            actor_id: actor.id,
            old_value,
            new_value,
            created_at: Utc::now(),
        };
        let row = match serde_json::to_value(&entry) {
            Ok(row) => row,
            Err(e) => {
                warn!("audit entry for {} not encodable: {}", account_id, e);
                return;
            }
        };
        if let Err(e) = self.rows.insert(TABLE, row).await {
            warn!(
                "audit write for {:?} on {} failed: {}",
                entry.action, account_id, e
            );
        }
    }
}

/// Per-account audit trail view.
pub struct AuditStore {
    store: ScopedStore<AuditEntry>,
}

impl AuditStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            store: ScopedStore::new(
                state,
                StoreSpec {
                    table: "support_audit_log",
                    scope_column: Some("account_id"),
                    order: Some(Order::asc("created_at")),
                    live: LivePolicy::None,
                },
            ),
        }
    }

    pub async fn open(&self, account: Option<Uuid>) -> Result<(), StoreError> {
        self.store.activate(account).await
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.store.snapshot().await
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }
}
