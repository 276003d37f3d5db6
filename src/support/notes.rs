use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::platform::{Order, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const TABLE: &str = "internal_notes";

/// Staff-only annotation on a conversation; the requester never sees these.
/// Mentioned agents get pinged by the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalNote {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub mentions: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

pub struct NoteStore {
    store: ScopedStore<InternalNote>,
    rows: Arc<dyn RowStore>,
}

impl NoteStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            store: ScopedStore::new(
                state,
                StoreSpec {
                    table: "internal_notes",
                    scope_column: Some("conversation_id"),
                    order: Some(Order::asc("created_at")),
                    live: LivePolicy::AppendInserts,
                },
            ),
            rows: Arc::clone(&state.rows),
        }
    }

    pub async fn open(&self, conversation: Option<Uuid>) -> Result<(), StoreError> {
        self.store.activate_live(conversation).await
    }

    pub async fn close(&self) {
        self.store.deactivate().await
    }

    pub async fn notes(&self) -> Vec<InternalNote> {
        self.store.snapshot().await
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub async fn add(
        &self,
        actor: Option<&Actor>,
        conversation_id: Uuid,
        body: &str,
        mentions: Vec<Uuid>,
    ) -> Result<InternalNote, StoreError> {
        let actor = require_actor(actor)?;
        let body = body.trim();
        if body.is_empty() {
            return Err(StoreError::Validation("note body is empty".to_string()));
        }

        let note = InternalNote {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: actor.id,
            body: body.to_string(),
            mentions,
            created_at: Utc::now(),
        };
        let row = serde_json::to_value(&note)
            .map_err(|e| StoreError::Remote(format!("encode note failed: {}", e)))?;
        self.rows.insert(TABLE, row).await?;
        Ok(note)
    }
}
