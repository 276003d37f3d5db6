//! Actor resolution against the platform's auth service.
//!
//! Writes never consult the session implicitly: callers resolve an [`Actor`]
//! once and pass it down, so the authentication precondition is visible in
//! every mutating signature.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::PlatformConfig;
use crate::shared::error::StoreError;

/// The authenticated identity attributed to writes and audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
}

#[async_trait]
pub trait Session: Send + Sync {
    async fn current_actor(&self) -> Option<Actor>;
}

/// Fails fast before any remote call when no actor was resolved.
pub fn require_actor(actor: Option<&Actor>) -> Result<Actor, StoreError> {
    actor.copied().ok_or(StoreError::NotAuthenticated)
}

/// Session backed by the hosted auth endpoint.
pub struct HostedSession {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: RwLock<Option<String>>,
}

impl HostedSession {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            access_token: RwLock::new(None),
        }
    }

    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }
}

#[async_trait]
impl Session for HostedSession {
    async fn current_actor(&self) -> Option<Actor> {
        let token = self.access_token.read().await.as_ref()?.clone();
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }

        #[derive(Deserialize)]
        struct UserPayload {
            id: Uuid,
        }

        let user: UserPayload = response.json().await.ok()?;
        Some(Actor { id: user.id })
    }
}
