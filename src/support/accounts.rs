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

use super::audit::{AuditAction, AuditRecorder};

pub const TABLE: &str = "support_accounts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Support,
    Supervisor,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub access_level: AccessLevel,
    pub is_active: bool,
    pub chat_linked: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct UpdateAccount {
    pub access_level: Option<AccessLevel>,
    pub is_active: Option<bool>,
    pub chat_linked: Option<bool>,
}

/// Support-staff account management. Every mutation leaves an audit entry
/// behind (best-effort, see [`AuditRecorder`]); deletions log theirs before
/// the row disappears so the snapshot still references real data.
pub struct AccountStore {
    store: ScopedStore<SupportAccount>,
    rows: Arc<dyn RowStore>,
    audit: AuditRecorder,
    email_domain: Option<String>,
}

impl AccountStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            store: ScopedStore::new(
                state,
                StoreSpec {
                    table: "support_accounts",
                    scope_column: None,
                    order: Some(Order::asc("created_at")),
                    live: LivePolicy::None,
                },
            ),
            rows: Arc::clone(&state.rows),
            audit: AuditRecorder::new(state),
            email_domain: state.config.support.email_domain.clone(),
        }
    }

    pub async fn load(&self) -> Result<(), StoreError> {
        self.store.activate(None).await
    }

    pub async fn accounts(&self) -> Vec<SupportAccount> {
        self.store.snapshot().await
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    fn check_email(&self, email: &str) -> Result<(), StoreError> {
        if !email.contains('@') {
            return Err(StoreError::Validation(format!(
                "{} is not a valid email address",
                email
            )));
        }
        if let Some(domain) = &self.email_domain {
            let suffix = format!("@{}", domain);
            if !email.ends_with(suffix.as_str()) {
                return Err(StoreError::Validation(format!(
                    "email must belong to the {} domain",
                    domain
                )));
            }
        }
        Ok(())
    }

    pub async fn create(
        &self,
        actor: Option<&Actor>,
        user_id: Uuid,
        email: &str,
        access_level: AccessLevel,
    ) -> Result<SupportAccount, StoreError> {
        let actor = require_actor(actor)?;
        let email = email.trim().to_lowercase();
        self.check_email(&email)?;

        let now = Utc::now();
        let account = SupportAccount {
            id: Uuid::new_v4(),
            user_id,
            email,
            access_level,
            is_active: true,
            chat_linked: false,
            created_by: actor.id,
            created_at: now,
            updated_at: now,
        };
        let row = serde_json::to_value(&account)
            .map_err(|e| StoreError::Remote(format!("encode account failed: {}", e)))?;
        self.rows.insert(TABLE, row.clone()).await?;

        // The account row did not exist when this action started; the entry
        // carries the sentinel id and the full new snapshot.
        self.audit
            .record(AuditAction::Create, Uuid::nil(), &actor, None, Some(row))
            .await;

        self.store.refetch().await.ok();
        Ok(account)
    }

    pub async fn update(
        &self,
        actor: Option<&Actor>,
        id: Uuid,
        changes: UpdateAccount,
    ) -> Result<(), StoreError> {
        let actor = require_actor(actor)?;

        let filters = [Filter::eq("id", id)];
        let old_value = self
            .rows
            .select(TABLE, &filters, None)
            .await?
            .into_iter()
            .next();

        let mut patch = serde_json::Map::new();
        if let Some(level) = changes.access_level {
            patch.insert(
                "access_level".to_string(),
                serde_json::to_value(level)
                    .map_err(|e| StoreError::Remote(format!("encode access level failed: {}", e)))?,
            );
        }
        if let Some(is_active) = changes.is_active {
            patch.insert("is_active".to_string(), Value::Bool(is_active));
        }
        if let Some(chat_linked) = changes.chat_linked {
            patch.insert("chat_linked".to_string(), Value::Bool(chat_linked));
        }
        if patch.is_empty() {
            return Ok(());
        }
        patch.insert(
            "updated_at".to_string(),
            serde_json::to_value(Utc::now())
                .map_err(|e| StoreError::Remote(format!("encode timestamp failed: {}", e)))?,
        );

        let updated = self
            .rows
            .update(TABLE, &filters, Value::Object(patch))
            .await?;
        let new_value = updated.into_iter().next();

        self.audit
            .record(AuditAction::Update, id, &actor, old_value, new_value)
            .await;

        self.store.refetch().await.ok();
        Ok(())
    }

    pub async fn delete(&self, actor: Option<&Actor>, id: Uuid) -> Result<(), StoreError> {
        let actor = require_actor(actor)?;

        let filters = [Filter::eq("id", id)];
        let old_value = self
            .rows
            .select(TABLE, &filters, None)
            .await?
            .into_iter()
            .next();

        // Logged before the delete: the snapshot references data that is
        // about to disappear.
        self.audit
            .record(AuditAction::Delete, id, &actor, old_value, None)
            .await;

        self.rows.delete(TABLE, &filters).await?;
        self.store.refetch().await.ok();
        Ok(())
    }
}
