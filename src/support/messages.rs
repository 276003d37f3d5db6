use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::platform::{Filter, Order, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const TABLE: &str = "messages";

/// Append-only; there is no edit or delete for chat messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

/// Per-conversation message feed, oldest first. Sent messages come back over
/// the live feed rather than being appended optimistically.
pub struct MessageStore {
    store: ScopedStore<Message>,
    rows: Arc<dyn RowStore>,
}

impl MessageStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            store: ScopedStore::new(
                state,
                StoreSpec {
                    table: "messages",
                    scope_column: Some("conversation_id"),
                    order: Some(Order::asc("created_at")),
                    live: LivePolicy::AppendInserts,
                },
            ),
            rows: Arc::clone(&state.rows),
        }
    }

    /// Selecting no conversation clears the pane without a fetch.
    pub async fn open(&self, conversation: Option<Uuid>) -> Result<(), StoreError> {
        self.store.activate_live(conversation).await
    }

    pub async fn close(&self) {
        self.store.deactivate().await
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.store.snapshot().await
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub async fn send(
        &self,
        actor: Option<&Actor>,
        conversation_id: Uuid,
        body: &str,
        is_staff: bool,
    ) -> Result<Message, StoreError> {
        let actor = require_actor(actor)?;
        let body = body.trim();
        if body.is_empty() {
            return Err(StoreError::Validation("message body is empty".to_string()));
        }

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: actor.id,
            body: body.to_string(),
            is_staff,
            created_at: Utc::now(),
        };
        let row = serde_json::to_value(&message)
            .map_err(|e| StoreError::Remote(format!("encode message failed: {}", e)))?;
        self.rows.insert(TABLE, row).await?;

        if is_staff {
            self.stamp_first_response(conversation_id).await;
        }
        Ok(message)
    }

    /// The first staff reply stamps the conversation's `first_response_at`.
    /// This is a second, independent write; a failure here leaves the
    /// message committed and only the stamp missing.
    async fn stamp_first_response(&self, conversation_id: Uuid) {
        let filters = [Filter::eq("id", conversation_id)];
        let rows = match self
            .rows
            .select(super::conversations::TABLE, &filters, None)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("could not load conversation {}: {}", conversation_id, e);
                return;
            }
        };
        let unanswered = rows
            .first()
            .map(|row| row.get("first_response_at").map_or(true, |v| v.is_null()))
            .unwrap_or(false);
        if !unanswered {
            return;
        }

        let patch = serde_json::json!({
            "first_response_at": Utc::now(),
            "updated_at": Utc::now(),
        });
        if let Err(e) = self
            .rows
            .update(super::conversations::TABLE, &filters, patch)
            .await
        {
            warn!(
                "failed to stamp first response on {}: {}",
                conversation_id, e
            );
        }
    }
}
