use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::platform::{Filter, Order, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const TABLE: &str = "welcome_messages";

/// Greeting template shown when a chat opens. `{{name}}` is resolved at
/// render time and never stored resolved. A null team applies to all teams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub id: Uuid,
    pub team_id: Option<Uuid>,
    pub template: String,
    pub is_active: bool,
    pub starts_at: Option<NaiveTime>,
    pub ends_at: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WelcomeMessage {
    pub fn render(&self, name: &str) -> String {
        self.template.replace("{{name}}", name)
    }

    /// A start later than the end means the window crosses midnight
    /// (22:00–06:00 night shifts).
    pub fn is_open_at(&self, at: NaiveTime) -> bool {
        match (self.starts_at, self.ends_at) {
            (Some(start), Some(end)) if start <= end => at >= start && at <= end,
            (Some(start), Some(end)) => at >= start || at <= end,
            (Some(start), None) => at >= start,
            (None, Some(end)) => at <= end,
            (None, None) => true,
        }
    }
}

/// The active, in-window message for a team; team-specific messages win over
/// the all-teams fallbacks.
pub fn pick_for_team(
    messages: &[WelcomeMessage],
    team: Option<Uuid>,
    at: NaiveTime,
) -> Option<WelcomeMessage> {
    let open: Vec<&WelcomeMessage> = messages
        .iter()
        .filter(|m| m.is_active && m.is_open_at(at))
        .collect();
    team.and_then(|team_id| {
        open.iter()
            .find(|m| m.team_id == Some(team_id))
            .map(|m| (*m).clone())
    })
    .or_else(|| {
        open.iter()
            .find(|m| m.team_id.is_none())
            .map(|m| (*m).clone())
    })
}

#[derive(Debug, Default)]
pub struct UpdateWelcomeMessage {
    pub template: Option<String>,
    pub is_active: Option<bool>,
    pub starts_at: Option<Option<NaiveTime>>,
    pub ends_at: Option<Option<NaiveTime>>,
}

pub struct WelcomeStore {
    store: ScopedStore<WelcomeMessage>,
    rows: Arc<dyn RowStore>,
}

impl WelcomeStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            store: ScopedStore::new(
                state,
                StoreSpec {
                    table: "welcome_messages",
                    scope_column: None,
                    order: Some(Order::desc("created_at")),
                    live: LivePolicy::None,
                },
            ),
            rows: Arc::clone(&state.rows),
        }
    }

    pub async fn load(&self) -> Result<(), StoreError> {
        self.store.activate(None).await
    }

    pub async fn messages(&self) -> Vec<WelcomeMessage> {
        self.store.snapshot().await
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub async fn greeting_for(&self, team: Option<Uuid>, name: &str) -> Option<String> {
        let now = Utc::now().time();
        pick_for_team(&self.store.snapshot().await, team, now).map(|m| m.render(name))
    }

    pub async fn create(
        &self,
        actor: Option<&Actor>,
        team_id: Option<Uuid>,
        template: &str,
        starts_at: Option<NaiveTime>,
        ends_at: Option<NaiveTime>,
    ) -> Result<WelcomeMessage, StoreError> {
        require_actor(actor)?;
        let template = template.trim();
        if template.is_empty() {
            return Err(StoreError::Validation(
                "welcome message template is required".to_string(),
            ));
        }

        let now = Utc::now();
        let message = WelcomeMessage {
            id: Uuid::new_v4(),
            team_id,
            template: template.to_string(),
            is_active: true,
            starts_at,
            ends_at,
            created_at: now,
            updated_at: now,
        };
        let row = serde_json::to_value(&message)
            .map_err(|e| StoreError::Remote(format!("encode welcome message failed: {}", e)))?;
        self.rows.insert(TABLE, row).await?;
        self.store.refetch().await.ok();
        Ok(message)
    }

    pub async fn update(
        &self,
        actor: Option<&Actor>,
        id: Uuid,
        changes: UpdateWelcomeMessage,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;
        let mut patch = serde_json::Map::new();
        if let Some(template) = changes.template {
            patch.insert("template".to_string(), Value::String(template));
        }
        if let Some(is_active) = changes.is_active {
            patch.insert("is_active".to_string(), Value::Bool(is_active));
        }
        if let Some(starts_at) = changes.starts_at {
            patch.insert(
                "starts_at".to_string(),
                serde_json::to_value(starts_at)
                    .map_err(|e| StoreError::Remote(format!("encode window failed: {}", e)))?,
            );
        }
        if let Some(ends_at) = changes.ends_at {
            patch.insert(
                "ends_at".to_string(),
                serde_json::to_value(ends_at)
                    .map_err(|e| StoreError::Remote(format!("encode window failed: {}", e)))?,
            );
        }
        if patch.is_empty() {
            return Ok(());
        }
        patch.insert(
            "updated_at".to_string(),
            serde_json::to_value(Utc::now())
                .map_err(|e| StoreError::Remote(format!("encode timestamp failed: {}", e)))?,
        );
        self.rows
            .update(TABLE, &[Filter::eq("id", id)], Value::Object(patch))
            .await?;
        self.store.refetch().await.ok();
        Ok(())
    }

    pub async fn delete(&self, actor: Option<&Actor>, id: Uuid) -> Result<(), StoreError> {
        require_actor(actor)?;
        self.rows.delete(TABLE, &[Filter::eq("id", id)]).await?;
        self.store.refetch().await.ok();
        Ok(())
    }
}
