//! Interfaces to the hosted platform: the row-based CRUD store and the
//! realtime change feed. Both are traits so tests can substitute doubles;
//! the concrete implementations speak the platform's REST dialect.

pub mod realtime;
pub mod rest;

pub use realtime::{LiveFeed, SseRealtime};
pub use rest::RestRowStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shared::error::StoreError;

/// A single equality filter against a table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }

    /// Whether a row matches this filter, comparing on the JSON value's
    /// canonical string form (ids and enums are strings on the wire).
    pub fn matches(&self, row: &Value) -> bool {
        match row.get(self.column.as_str()) {
            Some(Value::String(s)) => *s == self.value,
            Some(other) => other.to_string() == self.value,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub column: &'static str,
    pub direction: Direction,
}

impl Order {
    pub fn asc(column: &'static str) -> Self {
        Self {
            column,
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: &'static str) -> Self {
        Self {
            column,
            direction: Direction::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Insert,
    Update,
    Delete,
}

/// A row-change event delivered on a live feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowEvent {
    pub kind: EventKind,
    pub table: String,
    pub record: Value,
}

/// Row-based CRUD against named tables in the hosted store.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> Result<Vec<Value>, StoreError>;

    /// Inserts one row and returns the stored representation.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError>;

    /// Patches all rows matching the filters, returning the updated rows.
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, StoreError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError>;
}

/// Subscribe-by-table-and-filter change feeds. The returned feed must be
/// explicitly closed (or dropped) by the consumer.
#[async_trait]
pub trait Realtime: Send + Sync {
    async fn subscribe(
        &self,
        table: &str,
        filter: Option<Filter>,
    ) -> Result<LiveFeed, StoreError>;
}
