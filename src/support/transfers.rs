use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::platform::{Filter, Order, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const TABLE: &str = "chat_transfers";

/// History row for a reassignment. Exactly one of `to_agent` / `to_team` is
/// set; the check is a client-side precondition, not a data constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTransfer {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub from_agent: Uuid,
    pub to_agent: Option<Uuid>,
    pub to_team: Option<Uuid>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Transferring is two independent writes: the history row, then the
/// conversation's assignment fields. They are not atomic, and this error
/// keeps the gap visible instead of papering over it.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("conversation was not reassigned after transfer {transfer_id} was recorded")]
    ReassignFailed {
        transfer_id: Uuid,
        #[source]
        source: StoreError,
    },
}

impl TransferError {
    pub fn user_message(&self) -> String {
        match self {
            TransferError::Store(e) => e.user_message(),
            TransferError::ReassignFailed { .. } => {
                "Transfer was recorded but the conversation was not reassigned.".to_string()
            }
        }
    }
}

pub struct TransferStore {
    store: ScopedStore<ChatTransfer>,
    rows: Arc<dyn RowStore>,
}

impl TransferStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            store: ScopedStore::new(
                state,
                StoreSpec {
                    table: "chat_transfers",
                    scope_column: Some("conversation_id"),
                    order: Some(Order::asc("created_at")),
                    live: LivePolicy::None,
                },
            ),
            rows: Arc::clone(&state.rows),
        }
    }

    pub async fn open(&self, conversation: Option<Uuid>) -> Result<(), StoreError> {
        self.store.activate(conversation).await
    }

    pub async fn close(&self) {
        self.store.deactivate().await
    }

    pub async fn transfers(&self) -> Vec<ChatTransfer> {
        self.store.snapshot().await
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    /// Hands the conversation to another agent or team.
    ///
    /// Phase one inserts the transfer row; phase two updates the owning
    /// conversation. A phase-two failure surfaces as
    /// [`TransferError::ReassignFailed`] with the committed transfer id, and
    /// [`TransferStore::revert`] is the compensating action for that case.
    pub async fn transfer_chat(
        &self,
        actor: Option<&Actor>,
        conversation_id: Uuid,
        to_agent: Option<Uuid>,
        to_team: Option<Uuid>,
        reason: Option<String>,
    ) -> Result<ChatTransfer, TransferError> {
        if to_agent.is_none() && to_team.is_none() {
            return Err(StoreError::Precondition(
                "select at least one destination for the transfer".to_string(),
            )
            .into());
        }
        let actor = require_actor(actor)?;

        let transfer = ChatTransfer {
            id: Uuid::new_v4(),
            conversation_id,
            from_agent: actor.id,
            to_agent,
            to_team,
            reason: reason.filter(|r| !r.trim().is_empty()),
            created_at: Utc::now(),
        };
        let row = serde_json::to_value(&transfer)
            .map_err(|e| StoreError::Remote(format!("encode transfer failed: {}", e)))?;
        self.rows.insert(TABLE, row).await?;

        let mut patch = serde_json::Map::new();
        if let Some(agent) = to_agent {
            patch.insert("assigned_to".to_string(), Value::String(agent.to_string()));
        }
        if let Some(team) = to_team {
            patch.insert("team_id".to_string(), Value::String(team.to_string()));
        }
        patch.insert(
            "updated_at".to_string(),
            serde_json::to_value(Utc::now())
                .map_err(|e| StoreError::Remote(format!("encode timestamp failed: {}", e)))?,
        );
        if let Err(source) = self
            .rows
            .update(
                super::conversations::TABLE,
                &[Filter::eq("id", conversation_id)],
                Value::Object(patch),
            )
            .await
        {
            return Err(TransferError::ReassignFailed {
                transfer_id: transfer.id,
                source,
            });
        }

        if self.store.current_scope().await == Some(conversation_id) {
            self.store.refetch().await.ok();
        }
        Ok(transfer)
    }

    /// Deletes a transfer row whose reassignment never landed.
    pub async fn revert(&self, actor: Option<&Actor>, transfer_id: Uuid) -> Result<(), StoreError> {
        require_actor(actor)?;
        self.rows
            .delete(TABLE, &[Filter::eq("id", transfer_id)])
            .await?;
        if self.store.current_scope().await.is_some() {
            self.store.refetch().await.ok();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassign_failure_has_its_own_notice() {
        let err = TransferError::ReassignFailed {
            transfer_id: Uuid::new_v4(),
            source: StoreError::Remote("update conversations failed".to_string()),
        };
        assert_eq!(
            err.user_message(),
            "Transfer was recorded but the conversation was not reassigned."
        );
    }

    #[test]
    fn store_errors_keep_their_notice() {
        let err = TransferError::Store(StoreError::Precondition(
            "select at least one destination for the transfer".to_string(),
        ));
        assert_eq!(
            err.user_message(),
            "select at least one destination for the transfer"
        );
    }
}
