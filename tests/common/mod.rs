//! Test doubles for the platform transports: a row store that records every
//! call and can be scripted to fail or stall per table, and a realtime hub
//! that delivers hand-injected events to whoever is subscribed.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use gestor::platform::{
    EventKind, Filter, LiveFeed, Order, Realtime, RowEvent, RowStore,
};
use gestor::shared::error::StoreError;
use gestor::{AppConfig, AppState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Select(String),
    Insert(String),
    Update(String),
    Delete(String),
}

#[derive(Default)]
pub struct MockRows {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    calls: Mutex<Vec<Call>>,
    fail_select: Mutex<HashSet<String>>,
    fail_insert: Mutex<HashSet<String>>,
    fail_update: Mutex<HashSet<String>>,
    delay_select: Mutex<HashMap<String, VecDeque<u64>>>,
}

impl MockRows {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables.lock().unwrap().insert(table.to_string(), rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn fail_select_on(&self, table: &str) {
        self.fail_select.lock().unwrap().insert(table.to_string());
    }

    pub fn restore_select(&self, table: &str) {
        self.fail_select.lock().unwrap().remove(table);
    }

    pub fn fail_insert_on(&self, table: &str) {
        self.fail_insert.lock().unwrap().insert(table.to_string());
    }

    pub fn fail_update_on(&self, table: &str) {
        self.fail_update.lock().unwrap().insert(table.to_string());
    }

    /// The next select against `table` sleeps this long before answering.
    pub fn delay_next_select(&self, table: &str, millis: u64) {
        self.delay_select
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push_back(millis);
    }

    fn matching(rows: &[Value], filters: &[Filter]) -> Vec<Value> {
        rows.iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RowStore for MockRows {
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        _order: Option<&Order>,
    ) -> Result<Vec<Value>, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Select(table.to_string()));

        let delay = self
            .delay_select
            .lock()
            .unwrap()
            .get_mut(table)
            .and_then(|queue| queue.pop_front());
        if let Some(millis) = delay {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }

        if self.fail_select.lock().unwrap().contains(table) {
            return Err(StoreError::Remote(format!("select {} failed", table)));
        }

        let tables = self.tables.lock().unwrap();
        let rows = tables.get(table).map(|r| r.as_slice()).unwrap_or(&[]);
        Ok(Self::matching(rows, filters))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Insert(table.to_string()));
        if self.fail_insert.lock().unwrap().contains(table) {
            return Err(StoreError::Remote(format!("insert into {} failed", table)));
        }
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Update(table.to_string()));
        if self.fail_update.lock().unwrap().contains(table) {
            return Err(StoreError::Remote(format!("update {} failed", table)));
        }

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table.to_string()).or_default();
        let mut updated = Vec::new();
        for row in rows.iter_mut() {
            if filters.iter().all(|f| f.matches(row)) {
                if let (Value::Object(target), Value::Object(changes)) =
                    (&mut *row, &patch)
                {
                    for (key, value) in changes {
                        target.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(table.to_string()));
        let mut tables = self.tables.lock().unwrap();
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| !filters.iter().all(|f| f.matches(row)));
        }
        Ok(())
    }
}

struct LiveSub {
    table: String,
    filter: Option<Filter>,
    tx: mpsc::Sender<RowEvent>,
}

#[derive(Default)]
pub struct MockLive {
    subs: Mutex<Vec<LiveSub>>,
}

impl MockLive {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscription_count(&self) -> usize {
        self.subs.lock().unwrap().len()
    }

    pub fn open_subscriptions(&self) -> usize {
        self.subs
            .lock()
            .unwrap()
            .iter()
            .filter(|sub| !sub.tx.is_closed())
            .count()
    }

    /// Pushes an event to every open subscription whose table and filter
    /// match the record.
    pub async fn emit(&self, table: &str, kind: EventKind, record: Value) {
        let event = RowEvent {
            kind,
            table: table.to_string(),
            record,
        };
        let targets: Vec<mpsc::Sender<RowEvent>> = {
            let subs = self.subs.lock().unwrap();
            subs.iter()
                .filter(|sub| sub.table == table)
                .filter(|sub| {
                    sub.filter
                        .as_ref()
                        .map(|f| f.matches(&event.record))
                        .unwrap_or(true)
                })
                .map(|sub| sub.tx.clone())
                .collect()
        };
        for tx in targets {
            let _ = tx.send(event.clone()).await;
        }
    }
}

#[async_trait]
impl Realtime for MockLive {
    async fn subscribe(
        &self,
        table: &str,
        filter: Option<Filter>,
    ) -> Result<LiveFeed, StoreError> {
        let (tx, rx) = mpsc::channel(16);
        let (stop_tx, _stop_rx) = oneshot::channel();
        self.subs.lock().unwrap().push(LiveSub {
            table: table.to_string(),
            filter,
            tx,
        });
        Ok(LiveFeed::new(rx, stop_tx))
    }
}

pub fn state_with(rows: &Arc<MockRows>, live: &Arc<MockLive>) -> Arc<AppState> {
    state_with_config(rows, live, AppConfig::default())
}

pub fn state_with_config(
    rows: &Arc<MockRows>,
    live: &Arc<MockLive>,
    config: AppConfig,
) -> Arc<AppState> {
    let _ = env_logger::builder().is_test(true).try_init();
    AppState::new(
        Arc::clone(rows) as Arc<dyn RowStore>,
        Arc::clone(live) as Arc<dyn Realtime>,
        config,
    )
}

/// Lets spawned feed-consumer tasks drain their queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
