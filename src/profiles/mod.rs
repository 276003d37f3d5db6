use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::platform::{Filter, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const TABLE: &str = "profiles";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub company_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Single-record store keyed by the signed-in user.
pub struct ProfileStore {
    store: ScopedStore<Profile>,
    rows: Arc<dyn RowStore>,
}

impl ProfileStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            store: ScopedStore::new(
                state,
                StoreSpec {
                    table: "profiles",
                    scope_column: Some("user_id"),
                    order: None,
                    live: LivePolicy::None,
                },
            ),
            rows: Arc::clone(&state.rows),
        }
    }

    pub async fn open(&self, user: Option<Uuid>) -> Result<(), StoreError> {
        self.store.activate(user).await
    }

    pub async fn current(&self) -> Option<Profile> {
        self.store.snapshot().await.into_iter().next()
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    /// Creates or updates the actor's own profile.
    pub async fn save(
        &self,
        actor: Option<&Actor>,
        display_name: &str,
        company_name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<Profile, StoreError> {
        let actor = require_actor(actor)?;
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(StoreError::Validation("display name is required".to_string()));
        }

        let filters = [Filter::eq("user_id", actor.id)];
        let existing = self
            .rows
            .select(TABLE, &filters, None)
            .await?
            .into_iter()
            .next();

        let profile = match existing {
            Some(row) => {
                let mut profile: Profile = serde_json::from_value(row)
                    .map_err(|e| StoreError::Remote(format!("decode profile failed: {}", e)))?;
                profile.display_name = display_name.to_string();
                profile.company_name = company_name.clone();
                profile.avatar_url = avatar_url.clone();
                profile.updated_at = Utc::now();

                let patch = serde_json::json!({
                    "display_name": display_name,
                    "company_name": company_name,
                    "avatar_url": avatar_url,
                    "updated_at": profile.updated_at,
                });
                self.rows.update(TABLE, &filters, patch).await?;
                profile
            }
            None => {
                let now = Utc::now();
                let profile = Profile {
                    id: Uuid::new_v4(),
                    user_id: actor.id,
                    display_name: display_name.to_string(),
                    company_name,
                    avatar_url,
                    created_at: now,
                    updated_at: now,
                };
                let row = serde_json::to_value(&profile)
                    .map_err(|e| StoreError::Remote(format!("encode profile failed: {}", e)))?;
                self.rows.insert(TABLE, row).await?;
                profile
            }
        };

        self.store.refetch().await.ok();
        Ok(profile)
    }
}
