use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::platform::{Filter, Order, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const TABLE: &str = "conversations";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    InProgress,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub subject: String,
    pub status: ConversationStatus,
    pub priority: Priority,
    pub assigned_to: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The shared inbox: every conversation, newest first, following the live
/// feed. Inserts append; any update or delete refetches the whole list.
pub struct ConversationStore {
    store: ScopedStore<Conversation>,
    rows: Arc<dyn RowStore>,
}

impl ConversationStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            store: ScopedStore::new(
                state,
                StoreSpec {
                    table: "conversations",
                    scope_column: None,
                    order: Some(Order::desc("created_at")),
                    live: LivePolicy::AppendAndRefetch,
                },
            ),
            rows: Arc::clone(&state.rows),
        }
    }

    pub async fn open_inbox(&self) -> Result<(), StoreError> {
        self.store.activate_live(None).await
    }

    pub async fn close_inbox(&self) {
        self.store.deactivate().await
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.store.snapshot().await
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub async fn with_status(&self, status: ConversationStatus) -> Vec<Conversation> {
        self.store
            .snapshot()
            .await
            .into_iter()
            .filter(|c| c.status == status)
            .collect()
    }

    pub async fn assigned_to(&self, agent: Uuid) -> Vec<Conversation> {
        self.store
            .snapshot()
            .await
            .into_iter()
            .filter(|c| c.assigned_to == Some(agent))
            .collect()
    }

    /// Opens a new conversation on behalf of the requesting user. The insert
    /// comes back over the live feed; nothing is appended locally.
    pub async fn start(
        &self,
        actor: Option<&Actor>,
        subject: &str,
    ) -> Result<Conversation, StoreError> {
        let actor = require_actor(actor)?;
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(StoreError::Validation("subject is required".to_string()));
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            requester_id: actor.id,
            subject: subject.to_string(),
            status: ConversationStatus::Open,
            priority: Priority::Normal,
            assigned_to: None,
            team_id: None,
            first_response_at: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
        };
        let row = serde_json::to_value(&conversation)
            .map_err(|e| StoreError::Remote(format!("encode conversation failed: {}", e)))?;
        self.rows.insert(TABLE, row).await?;
        Ok(conversation)
    }

    /// Closing stamps `closed_at`; reopening clears it. The update event on
    /// the feed invalidates the list.
    pub async fn set_status(
        &self,
        actor: Option<&Actor>,
        id: Uuid,
        status: ConversationStatus,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;
        let closed_at = match status {
            ConversationStatus::Closed => serde_json::to_value(Utc::now())
                .map_err(|e| StoreError::Remote(format!("encode timestamp failed: {}", e)))?,
            _ => Value::Null,
        };
        let patch = serde_json::json!({
            "status": status,
            "closed_at": closed_at,
            "updated_at": Utc::now(),
        });
        self.rows
            .update(TABLE, &[Filter::eq("id", id)], patch)
            .await?;
        Ok(())
    }

    pub async fn set_priority(
        &self,
        actor: Option<&Actor>,
        id: Uuid,
        priority: Priority,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;
        let patch = serde_json::json!({
            "priority": priority,
            "updated_at": Utc::now(),
        });
        self.rows
            .update(TABLE, &[Filter::eq("id", id)], patch)
            .await?;
        Ok(())
    }

    /// Direct assignment outside the transfer flow (picking a chat up from
    /// the queue).
    pub async fn assign(
        &self,
        actor: Option<&Actor>,
        id: Uuid,
        agent: Option<Uuid>,
        team: Option<Uuid>,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;
        let mut patch = serde_json::Map::new();
        patch.insert(
            "assigned_to".to_string(),
            agent.map_or(Value::Null, |a| Value::String(a.to_string())),
        );
        patch.insert(
            "team_id".to_string(),
            team.map_or(Value::Null, |t| Value::String(t.to_string())),
        );
        patch.insert(
            "status".to_string(),
            serde_json::to_value(ConversationStatus::InProgress)
                .map_err(|e| StoreError::Remote(format!("encode status failed: {}", e)))?,
        );
        patch.insert(
            "updated_at".to_string(),
            serde_json::to_value(Utc::now())
                .map_err(|e| StoreError::Remote(format!("encode timestamp failed: {}", e)))?,
        );
        self.rows
            .update(TABLE, &[Filter::eq("id", id)], Value::Object(patch))
            .await?;
        Ok(())
    }
}
