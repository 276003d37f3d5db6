use std::sync::Arc;

use crate::config::AppConfig;
use crate::platform::{Realtime, RestRowStore, RowStore, SseRealtime};

/// Shared handles every store is built from.
pub struct AppState {
    pub rows: Arc<dyn RowStore>,
    pub live: Arc<dyn Realtime>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(rows: Arc<dyn RowStore>, live: Arc<dyn Realtime>, config: AppConfig) -> Arc<Self> {
        Arc::new(Self { rows, live, config })
    }

    /// Wire up the hosted platform transports from configuration.
    pub fn connect(config: AppConfig) -> Arc<Self> {
        let rows: Arc<dyn RowStore> = Arc::new(RestRowStore::new(&config.platform));
        let live: Arc<dyn Realtime> = Arc::new(SseRealtime::new(&config.platform));
        Self::new(rows, live, config)
    }
}
