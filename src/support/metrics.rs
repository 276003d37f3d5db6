//! Support dashboard aggregation. The whole dataset is refetched and
//! rescanned on every invocation; there is no windowing and no incremental
//! computation.

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::StoreError;
use crate::shared::state::AppState;

use super::conversations::{Conversation, ConversationStatus};
use super::tags::{ConversationTag, Tag};
use super::teams::SupportTeam;
use super::transfers::ChatTransfer;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub open: usize,
    pub in_progress: usize,
    pub closed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLoad {
    pub agent_id: Uuid,
    pub conversations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamLoad {
    pub team_id: Uuid,
    pub team_name: String,
    pub conversations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUsage {
    pub tag_id: Uuid,
    pub tag_name: String,
    pub uses: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportMetrics {
    pub total_conversations: usize,
    pub by_status: StatusCounts,
    pub avg_first_response_minutes: f64,
    pub avg_resolution_minutes: f64,
    /// Transfers as a percentage of total conversations.
    pub transfer_rate: f64,
    pub chats_by_agent: Vec<AgentLoad>,
    pub chats_by_team: Vec<TeamLoad>,
    pub chats_by_tag: Vec<TagUsage>,
}

fn mean_minutes(deltas_ms: &[i64]) -> f64 {
    if deltas_ms.is_empty() {
        return 0.0;
    }
    let total: f64 = deltas_ms.iter().map(|ms| *ms as f64).sum();
    total / deltas_ms.len() as f64 / 60_000.0
}

pub fn compute_support_metrics(
    conversations: &[Conversation],
    teams: &[SupportTeam],
    transfers: &[ChatTransfer],
    links: &[ConversationTag],
    tags: &[Tag],
) -> SupportMetrics {
    let total = conversations.len();

    let mut by_status = StatusCounts::default();
    for conversation in conversations {
        match conversation.status {
            ConversationStatus::Open => by_status.open += 1,
            ConversationStatus::InProgress => by_status.in_progress += 1,
            ConversationStatus::Closed => by_status.closed += 1,
        }
    }

    let first_response: Vec<i64> = conversations
        .iter()
        .filter_map(|c| {
            c.first_response_at
                .map(|at| (at - c.created_at).num_milliseconds())
        })
        .collect();
    let resolution: Vec<i64> = conversations
        .iter()
        .filter_map(|c| c.closed_at.map(|at| (at - c.created_at).num_milliseconds()))
        .collect();

    let transfer_rate = if total == 0 {
        0.0
    } else {
        transfers.len() as f64 / total as f64 * 100.0
    };

    let mut per_agent: HashMap<Uuid, usize> = HashMap::new();
    let mut per_team: HashMap<Uuid, usize> = HashMap::new();
    for conversation in conversations {
        if let Some(agent) = conversation.assigned_to {
            *per_agent.entry(agent).or_default() += 1;
        }
        if let Some(team) = conversation.team_id {
            *per_team.entry(team).or_default() += 1;
        }
    }

    let team_names: HashMap<Uuid, &str> =
        teams.iter().map(|t| (t.id, t.name.as_str())).collect();
    let tag_names: HashMap<Uuid, &str> = tags.iter().map(|t| (t.id, t.name.as_str())).collect();

    let mut per_tag: HashMap<Uuid, usize> = HashMap::new();
    for link in links {
        *per_tag.entry(link.tag_id).or_default() += 1;
    }

    let mut chats_by_agent: Vec<AgentLoad> = per_agent
        .into_iter()
        .map(|(agent_id, conversations)| AgentLoad {
            agent_id,
            conversations,
        })
        .collect();
    chats_by_agent.sort_by(|a, b| {
        b.conversations
            .cmp(&a.conversations)
            .then(a.agent_id.cmp(&b.agent_id))
    });

    let mut chats_by_team: Vec<TeamLoad> = per_team
        .into_iter()
        .map(|(team_id, conversations)| TeamLoad {
            team_id,
            team_name: team_names.get(&team_id).unwrap_or(&"unknown").to_string(),
            conversations,
        })
        .collect();
    chats_by_team.sort_by(|a, b| {
        b.conversations
            .cmp(&a.conversations)
            .then(a.team_id.cmp(&b.team_id))
    });

    let mut chats_by_tag: Vec<TagUsage> = per_tag
        .into_iter()
        .map(|(tag_id, uses)| TagUsage {
            tag_id,
            tag_name: tag_names.get(&tag_id).unwrap_or(&"unknown").to_string(),
            uses,
        })
        .collect();
    chats_by_tag.sort_by(|a, b| b.uses.cmp(&a.uses).then(a.tag_id.cmp(&b.tag_id)));

    SupportMetrics {
        total_conversations: total,
        by_status,
        avg_first_response_minutes: mean_minutes(&first_response),
        avg_resolution_minutes: mean_minutes(&resolution),
        transfer_rate,
        chats_by_agent,
        chats_by_team,
        chats_by_tag,
    }
}

fn decode_all<T: serde::de::DeserializeOwned>(table: &str, rows: Vec<serde_json::Value>) -> Vec<T> {
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        match serde_json::from_value(row) {
            Ok(item) => items.push(item),
            Err(e) => warn!("{}: dropping malformed row: {}", table, e),
        }
    }
    items
}

/// Pulls the full support dataset (unbounded, unpaginated) and aggregates it
/// in memory.
pub async fn load_support_metrics(state: &Arc<AppState>) -> Result<SupportMetrics, StoreError> {
    let conversations: Vec<Conversation> = decode_all(
        super::conversations::TABLE,
        state
            .rows
            .select(super::conversations::TABLE, &[], None)
            .await?,
    );
    let teams: Vec<SupportTeam> = decode_all(
        super::teams::TEAMS_TABLE,
        state.rows.select(super::teams::TEAMS_TABLE, &[], None).await?,
    );
    let transfers: Vec<ChatTransfer> = decode_all(
        super::transfers::TABLE,
        state.rows.select(super::transfers::TABLE, &[], None).await?,
    );
    let links: Vec<ConversationTag> = decode_all(
        super::tags::LINKS_TABLE,
        state.rows.select(super::tags::LINKS_TABLE, &[], None).await?,
    );
    let tags: Vec<Tag> = decode_all(
        super::tags::TAGS_TABLE,
        state.rows.select(super::tags::TAGS_TABLE, &[], None).await?,
    );

    Ok(compute_support_metrics(
        &conversations,
        &teams,
        &transfers,
        &links,
        &tags,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::conversations::Priority;
    use chrono::{Duration, Utc};

    fn conversation(
        status: ConversationStatus,
        assigned_to: Option<Uuid>,
        team_id: Option<Uuid>,
        first_response_after: Option<Duration>,
        closed_after: Option<Duration>,
    ) -> Conversation {
        let created = Utc::now() - Duration::hours(4);
        Conversation {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            subject: "help".to_string(),
            status,
            priority: Priority::Normal,
            assigned_to,
            team_id,
            first_response_at: first_response_after.map(|d| created + d),
            closed_at: closed_after.map(|d| created + d),
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn empty_dataset_reports_zeros_not_nan() {
        let metrics = compute_support_metrics(&[], &[], &[], &[], &[]);
        assert_eq!(metrics.total_conversations, 0);
        assert_eq!(metrics.by_status, StatusCounts::default());
        assert_eq!(metrics.avg_first_response_minutes, 0.0);
        assert_eq!(metrics.avg_resolution_minutes, 0.0);
        assert_eq!(metrics.transfer_rate, 0.0);
        assert!(metrics.chats_by_agent.is_empty());
        assert!(metrics.chats_by_team.is_empty());
        assert!(metrics.chats_by_tag.is_empty());
    }

    #[test]
    fn first_response_average_over_answered_conversations() {
        let conversations = vec![
            conversation(
                ConversationStatus::Open,
                None,
                None,
                Some(Duration::minutes(10)),
                None,
            ),
            conversation(
                ConversationStatus::Open,
                None,
                None,
                Some(Duration::minutes(20)),
                None,
            ),
            // never answered: contributes nothing to the average
            conversation(ConversationStatus::Open, None, None, None, None),
        ];
        let metrics = compute_support_metrics(&conversations, &[], &[], &[], &[]);
        assert!((metrics.avg_first_response_minutes - 15.0).abs() < 1e-9);
    }

    #[test]
    fn resolution_average_uses_closed_conversations() {
        let conversations = vec![
            conversation(
                ConversationStatus::Closed,
                None,
                None,
                None,
                Some(Duration::minutes(60)),
            ),
            conversation(
                ConversationStatus::Closed,
                None,
                None,
                None,
                Some(Duration::minutes(120)),
            ),
        ];
        let metrics = compute_support_metrics(&conversations, &[], &[], &[], &[]);
        assert!((metrics.avg_resolution_minutes - 90.0).abs() < 1e-9);
        assert_eq!(metrics.by_status.closed, 2);
    }

    #[test]
    fn transfer_rate_is_percentage_of_conversations() {
        let conversations = vec![
            conversation(ConversationStatus::Open, None, None, None, None),
            conversation(ConversationStatus::Open, None, None, None, None),
            conversation(ConversationStatus::Open, None, None, None, None),
            conversation(ConversationStatus::Open, None, None, None, None),
        ];
        let transfer = ChatTransfer {
            id: Uuid::new_v4(),
            conversation_id: conversations[0].id,
            from_agent: Uuid::new_v4(),
            to_agent: Some(Uuid::new_v4()),
            to_team: None,
            reason: None,
            created_at: Utc::now(),
        };
        let metrics = compute_support_metrics(&conversations, &[], &[transfer], &[], &[]);
        assert!((metrics.transfer_rate - 25.0).abs() < 1e-9);
    }

    #[test]
    fn workloads_group_by_agent_team_and_tag() {
        let agent = Uuid::new_v4();
        let other_agent = Uuid::new_v4();
        let team = Uuid::new_v4();
        let conversations = vec![
            conversation(ConversationStatus::InProgress, Some(agent), Some(team), None, None),
            conversation(ConversationStatus::InProgress, Some(agent), Some(team), None, None),
            conversation(ConversationStatus::Open, Some(other_agent), None, None, None),
        ];
        let teams = vec![SupportTeam {
            id: team,
            name: "Billing".to_string(),
            description: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }];
        let tag = Tag {
            id: Uuid::new_v4(),
            name: "refund".to_string(),
            color: "#ff0000".to_string(),
            created_by: Uuid::new_v4(),
        };
        let links = vec![
            ConversationTag {
                id: Uuid::new_v4(),
                conversation_id: conversations[0].id,
                tag_id: tag.id,
                created_by: Uuid::new_v4(),
                created_at: Utc::now(),
            },
            ConversationTag {
                id: Uuid::new_v4(),
                conversation_id: conversations[1].id,
                tag_id: tag.id,
                created_by: Uuid::new_v4(),
                created_at: Utc::now(),
            },
        ];

        let metrics =
            compute_support_metrics(&conversations, &teams, &[], &links, &[tag.clone()]);
        assert_eq!(metrics.chats_by_agent[0].agent_id, agent);
        assert_eq!(metrics.chats_by_agent[0].conversations, 2);
        assert_eq!(metrics.chats_by_agent[1].conversations, 1);
        assert_eq!(metrics.chats_by_team[0].team_name, "Billing");
        assert_eq!(metrics.chats_by_team[0].conversations, 2);
        assert_eq!(metrics.chats_by_tag[0].tag_name, "refund");
        assert_eq!(metrics.chats_by_tag[0].uses, 2);
    }
}
