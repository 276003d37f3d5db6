use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::platform::{Filter, Order, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const TEAMS_TABLE: &str = "support_teams";
pub const MEMBERS_TABLE: &str = "team_members";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportTeam {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Member,
    Supervisor,
    Lead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub role: TeamRole,
    pub created_at: DateTime<Utc>,
}

pub struct TeamStore {
    teams: ScopedStore<SupportTeam>,
    members: ScopedStore<TeamMember>,
    rows: Arc<dyn RowStore>,
}

impl TeamStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            teams: ScopedStore::new(
                state,
                StoreSpec {
                    table: "support_teams",
                    scope_column: None,
                    order: Some(Order::asc("name")),
                    live: LivePolicy::None,
                },
            ),
            members: ScopedStore::new(
                state,
                StoreSpec {
                    table: "team_members",
                    scope_column: Some("team_id"),
                    order: Some(Order::asc("created_at")),
                    live: LivePolicy::None,
                },
            ),
            rows: Arc::clone(&state.rows),
        }
    }

    pub async fn load_teams(&self) -> Result<(), StoreError> {
        self.teams.activate(None).await
    }

    pub async fn teams(&self) -> Vec<SupportTeam> {
        self.teams.snapshot().await
    }

    pub async fn open_team(&self, team: Option<Uuid>) -> Result<(), StoreError> {
        self.members.activate(team).await
    }

    pub async fn members(&self) -> Vec<TeamMember> {
        self.members.snapshot().await
    }

    pub async fn create_team(
        &self,
        actor: Option<&Actor>,
        name: &str,
        description: Option<String>,
    ) -> Result<SupportTeam, StoreError> {
        let actor = require_actor(actor)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("team name is required".to_string()));
        }

        let now = Utc::now();
        let team = SupportTeam {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.filter(|d| !d.trim().is_empty()),
            created_by: actor.id,
            created_at: now,
            updated_at: now,
        };
        let row = serde_json::to_value(&team)
            .map_err(|e| StoreError::Remote(format!("encode team failed: {}", e)))?;
        self.rows.insert(TEAMS_TABLE, row).await?;
        self.teams.refetch().await.ok();
        Ok(team)
    }

    pub async fn rename_team(
        &self,
        actor: Option<&Actor>,
        id: Uuid,
        name: &str,
        description: Option<String>,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("team name is required".to_string()));
        }
        let patch = serde_json::json!({
            "name": name,
            "description": description,
            "updated_at": Utc::now(),
        });
        self.rows
            .update(TEAMS_TABLE, &[Filter::eq("id", id)], patch)
            .await?;
        self.teams.refetch().await.ok();
        Ok(())
    }

    pub async fn delete_team(&self, actor: Option<&Actor>, id: Uuid) -> Result<(), StoreError> {
        require_actor(actor)?;
        self.rows
            .delete(TEAMS_TABLE, &[Filter::eq("id", id)])
            .await?;
        self.teams.refetch().await.ok();
        Ok(())
    }

    pub async fn add_member(
        &self,
        actor: Option<&Actor>,
        team_id: Uuid,
        user_id: Uuid,
        role: TeamRole,
    ) -> Result<TeamMember, StoreError> {
        require_actor(actor)?;
        let member = TeamMember {
            id: Uuid::new_v4(),
            team_id,
            user_id,
            role,
            created_at: Utc::now(),
        };
        let row = serde_json::to_value(&member)
            .map_err(|e| StoreError::Remote(format!("encode member failed: {}", e)))?;
        self.rows.insert(MEMBERS_TABLE, row).await?;
        if self.members.current_scope().await == Some(team_id) {
            self.members.refetch().await.ok();
        }
        Ok(member)
    }

    pub async fn set_member_role(
        &self,
        actor: Option<&Actor>,
        member_id: Uuid,
        role: TeamRole,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;
        let patch = serde_json::json!({ "role": role });
        self.rows
            .update(MEMBERS_TABLE, &[Filter::eq("id", member_id)], patch)
            .await?;
        self.members.refetch().await.ok();
        Ok(())
    }

    pub async fn remove_member(
        &self,
        actor: Option<&Actor>,
        member_id: Uuid,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;
        self.rows
            .delete(MEMBERS_TABLE, &[Filter::eq("id", member_id)])
            .await?;
        self.members.refetch().await.ok();
        Ok(())
    }
}
