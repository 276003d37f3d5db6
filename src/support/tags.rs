use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::platform::{Filter, Order, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const TAGS_TABLE: &str = "tags";
pub const LINKS_TABLE: &str = "conversation_tags";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub created_by: Uuid,
}

/// Conversation × Tag join row. One row per (conversation, tag) pair;
/// attaching an already-attached tag returns the existing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTag {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub tag_id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

pub struct TagStore {
    tags: ScopedStore<Tag>,
    links: ScopedStore<ConversationTag>,
    rows: Arc<dyn RowStore>,
}

impl TagStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            tags: ScopedStore::new(
                state,
                StoreSpec {
                    table: "tags",
                    scope_column: None,
                    order: Some(Order::asc("name")),
                    live: LivePolicy::None,
                },
            ),
            links: ScopedStore::new(
                state,
                StoreSpec {
                    table: "conversation_tags",
                    scope_column: Some("conversation_id"),
                    order: Some(Order::asc("created_at")),
                    live: LivePolicy::None,
                },
            ),
            rows: Arc::clone(&state.rows),
        }
    }

    pub async fn load_tags(&self) -> Result<(), StoreError> {
        self.tags.activate(None).await
    }

    pub async fn tags(&self) -> Vec<Tag> {
        self.tags.snapshot().await
    }

    pub async fn open_conversation(&self, conversation: Option<Uuid>) -> Result<(), StoreError> {
        self.links.activate(conversation).await
    }

    pub async fn conversation_tags(&self) -> Vec<ConversationTag> {
        self.links.snapshot().await
    }

    pub async fn create_tag(
        &self,
        actor: Option<&Actor>,
        name: &str,
        color: &str,
    ) -> Result<Tag, StoreError> {
        let actor = require_actor(actor)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("tag name is required".to_string()));
        }

        let tag = Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: color.to_string(),
            created_by: actor.id,
        };
        let row = serde_json::to_value(&tag)
            .map_err(|e| StoreError::Remote(format!("encode tag failed: {}", e)))?;
        self.rows.insert(TAGS_TABLE, row).await?;
        self.tags.refetch().await.ok();
        Ok(tag)
    }

    /// Attaches a tag to a conversation, idempotently: the existing join row
    /// is returned when the pair is already present.
    pub async fn attach(
        &self,
        actor: Option<&Actor>,
        conversation_id: Uuid,
        tag_id: Uuid,
    ) -> Result<ConversationTag, StoreError> {
        let actor = require_actor(actor)?;

        let filters = [
            Filter::eq("conversation_id", conversation_id),
            Filter::eq("tag_id", tag_id),
        ];
        let existing = self.rows.select(LINKS_TABLE, &filters, None).await?;
        if let Some(row) = existing.into_iter().next() {
            return serde_json::from_value(row)
                .map_err(|e| StoreError::Remote(format!("decode conversation tag failed: {}", e)));
        }

        let link = ConversationTag {
            id: Uuid::new_v4(),
            conversation_id,
            tag_id,
            created_by: actor.id,
            created_at: Utc::now(),
        };
        let row = serde_json::to_value(&link)
            .map_err(|e| StoreError::Remote(format!("encode conversation tag failed: {}", e)))?;
        self.rows.insert(LINKS_TABLE, row).await?;
        if self.links.current_scope().await == Some(conversation_id) {
            self.links.refetch().await.ok();
        }
        Ok(link)
    }

    pub async fn detach(
        &self,
        actor: Option<&Actor>,
        conversation_id: Uuid,
        tag_id: Uuid,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;
        let filters = [
            Filter::eq("conversation_id", conversation_id),
            Filter::eq("tag_id", tag_id),
        ];
        self.rows.delete(LINKS_TABLE, &filters).await?;
        if self.links.current_scope().await == Some(conversation_id) {
            self.links.refetch().await.ok();
        }
        Ok(())
    }
}
