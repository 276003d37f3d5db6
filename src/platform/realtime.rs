use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

use crate::config::PlatformConfig;
use crate::shared::error::StoreError;

use super::{Filter, Realtime, RowEvent};

/// A standing change feed. Events stop flowing once the feed is closed or
/// dropped; the transport connection is torn down with it.
pub struct LiveFeed {
    events: mpsc::Receiver<RowEvent>,
    stop: Option<oneshot::Sender<()>>,
}

impl LiveFeed {
    pub fn new(events: mpsc::Receiver<RowEvent>, stop: oneshot::Sender<()>) -> Self {
        Self {
            events,
            stop: Some(stop),
        }
    }

    pub async fn next_event(&mut self) -> Option<RowEvent> {
        self.events.recv().await
    }

    pub fn close(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.events.close();
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.close();
    }
}

/// Change feeds over the platform's streaming endpoint: one long-lived HTTP
/// response carrying `data:`-prefixed JSON lines, one line per row event.
pub struct SseRealtime {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SseRealtime {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl Realtime for SseRealtime {
    async fn subscribe(
        &self,
        table: &str,
        filter: Option<Filter>,
    ) -> Result<LiveFeed, StoreError> {
        let mut url = format!("{}/realtime/v1/stream?table={}", self.base_url, table);
        if let Some(f) = &filter {
            url.push_str(&format!("&{}=eq.{}", f.column, f.value));
        }

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("subscribe to {} failed: {}", table, e)))?;
        if !response.status().is_success() {
            return Err(StoreError::Remote(format!(
                "subscribe to {} failed: HTTP {}",
                table,
                response.status()
            )));
        }

        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let table_name = table.to_string();

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut pending = String::new();
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        debug!("closing {} feed", table_name);
                        break;
                    }
                    chunk = stream.next() => {
                        let Some(chunk) = chunk else { break };
                        let bytes = match chunk {
                            Ok(bytes) => bytes,
                            Err(e) => {
                                warn!("{} feed broke: {}", table_name, e);
                                break;
                            }
                        };
                        pending.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = pending.find('\n') {
                            let line = pending[..pos].trim().to_string();
                            pending.drain(..=pos);
                            let Some(data) = line.strip_prefix("data: ") else { continue };
                            match serde_json::from_str::<RowEvent>(data) {
                                Ok(event) => {
                                    if tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => warn!("dropping malformed {} event: {}", table_name, e),
                            }
                        }
                    }
                }
            }
        });

        Ok(LiveFeed::new(rx, stop_tx))
    }
}
