use async_trait::async_trait;
use serde_json::Value;

use crate::config::PlatformConfig;
use crate::shared::error::StoreError;

use super::{Direction, Filter, Order, RowStore};

/// Row store over the platform's REST row API
/// (`/rest/v1/{table}` with `column=eq.value` query filters).
pub struct RestRowStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestRowStore {
    pub fn new(config: &PlatformConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn table_url(&self, table: &str, filters: &[Filter], order: Option<&Order>) -> String {
        let mut params: Vec<String> = filters
            .iter()
            .map(|f| format!("{}=eq.{}", f.column, f.value))
            .collect();
        if let Some(order) = order {
            let direction = match order.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            params.push(format!("order={}.{}", order.column, direction));
        }

        let mut url = format!("{}/rest/v1/{}", self.base_url, table);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

#[async_trait]
impl RowStore for RestRowStore {
    async fn select(
        &self,
        table: &str,
        filters: &[Filter],
        order: Option<&Order>,
    ) -> Result<Vec<Value>, StoreError> {
        let url = self.table_url(table, filters, order);
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("select {} failed: {}", table, e)))?;
        if !response.status().is_success() {
            return Err(StoreError::Remote(format!(
                "select {} failed: HTTP {}",
                table,
                response.status()
            )));
        }
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| StoreError::Remote(format!("select {} returned bad payload: {}", table, e)))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let url = self.table_url(table, &[], None);
        let response = self
            .authed(self.client.post(&url))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("insert into {} failed: {}", table, e)))?;
        if !response.status().is_success() {
            return Err(StoreError::Remote(format!(
                "insert into {} failed: HTTP {}",
                table,
                response.status()
            )));
        }
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Remote(format!("insert into {} returned bad payload: {}", table, e)))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Remote(format!("insert into {} returned no row", table)))
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, StoreError> {
        let url = self.table_url(table, filters, None);
        let response = self
            .authed(self.client.patch(&url))
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("update {} failed: {}", table, e)))?;
        if !response.status().is_success() {
            return Err(StoreError::Remote(format!(
                "update {} failed: HTTP {}",
                table,
                response.status()
            )));
        }
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| StoreError::Remote(format!("update {} returned bad payload: {}", table, e)))
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        let url = self.table_url(table, filters, None);
        let response = self
            .authed(self.client.delete(&url))
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("delete from {} failed: {}", table, e)))?;
        if !response.status().is_success() {
            return Err(StoreError::Remote(format!(
                "delete from {} failed: HTTP {}",
                table,
                response.status()
            )));
        }
        Ok(())
    }
}
