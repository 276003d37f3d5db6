use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::platform::{Filter, Order, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const TABLE: &str = "products";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub cost: Option<BigDecimal>,
    pub unit: String,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.low_stock_threshold
    }
}

#[derive(Debug, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub price: f64,
    pub cost: Option<f64>,
    pub unit: Option<String>,
    pub stock_quantity: Option<i32>,
    pub low_stock_threshold: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub cost: Option<f64>,
    pub unit: Option<String>,
    pub low_stock_threshold: Option<i32>,
    pub is_active: Option<bool>,
}

fn bd(val: f64) -> BigDecimal {
    BigDecimal::from_str(&val.to_string()).unwrap_or_else(|_| BigDecimal::from(0))
}

pub struct ProductStore {
    store: ScopedStore<Product>,
    rows: Arc<dyn RowStore>,
}

impl ProductStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            store: ScopedStore::new(
                state,
                StoreSpec {
                    table: "products",
                    scope_column: None,
                    order: Some(Order::asc("name")),
                    live: LivePolicy::None,
                },
            ),
            rows: Arc::clone(&state.rows),
        }
    }

    pub async fn load(&self) -> Result<(), StoreError> {
        self.store.activate(None).await
    }

    pub async fn products(&self) -> Vec<Product> {
        self.store.snapshot().await
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub async fn low_stock(&self) -> Vec<Product> {
        self.store
            .snapshot()
            .await
            .into_iter()
            .filter(|p| p.is_active && p.is_low_stock())
            .collect()
    }

    pub async fn create(
        &self,
        actor: Option<&Actor>,
        req: NewProduct,
    ) -> Result<Product, StoreError> {
        require_actor(actor)?;
        let name = req.name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("product name is required".to_string()));
        }
        if req.price < 0.0 {
            return Err(StoreError::Validation("price cannot be negative".to_string()));
        }
        if req.stock_quantity.unwrap_or(0) < 0 {
            return Err(StoreError::Validation(
                "stock quantity cannot be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            sku: req.sku,
            description: req.description,
            price: bd(req.price),
            cost: req.cost.map(bd),
            unit: req.unit.unwrap_or_else(|| "unit".to_string()),
            stock_quantity: req.stock_quantity.unwrap_or(0),
            low_stock_threshold: req.low_stock_threshold.unwrap_or(10),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let row = serde_json::to_value(&product)
            .map_err(|e| StoreError::Remote(format!("encode product failed: {}", e)))?;
        self.rows.insert(TABLE, row).await?;
        self.store.refetch().await.ok();
        Ok(product)
    }

    pub async fn update(
        &self,
        actor: Option<&Actor>,
        id: Uuid,
        changes: UpdateProduct,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;
        if let Some(price) = changes.price {
            if price < 0.0 {
                return Err(StoreError::Validation("price cannot be negative".to_string()));
            }
        }

        let mut patch = serde_json::Map::new();
        if let Some(name) = changes.name {
            patch.insert("name".to_string(), Value::String(name));
        }
        if let Some(sku) = changes.sku {
            patch.insert("sku".to_string(), Value::String(sku));
        }
        if let Some(description) = changes.description {
            patch.insert("description".to_string(), Value::String(description));
        }
        if let Some(price) = changes.price {
            patch.insert(
                "price".to_string(),
                serde_json::to_value(bd(price))
                    .map_err(|e| StoreError::Remote(format!("encode price failed: {}", e)))?,
            );
        }
        if let Some(cost) = changes.cost {
            patch.insert(
                "cost".to_string(),
                serde_json::to_value(bd(cost))
                    .map_err(|e| StoreError::Remote(format!("encode cost failed: {}", e)))?,
            );
        }
        if let Some(unit) = changes.unit {
            patch.insert("unit".to_string(), Value::String(unit));
        }
        if let Some(threshold) = changes.low_stock_threshold {
            patch.insert("low_stock_threshold".to_string(), threshold.into());
        }
        if let Some(is_active) = changes.is_active {
            patch.insert("is_active".to_string(), Value::Bool(is_active));
        }
        if patch.is_empty() {
            return Ok(());
        }
        patch.insert(
            "updated_at".to_string(),
            serde_json::to_value(Utc::now())
                .map_err(|e| StoreError::Remote(format!("encode timestamp failed: {}", e)))?,
        );

        self.rows
            .update(TABLE, &[Filter::eq("id", id)], Value::Object(patch))
            .await?;
        self.store.refetch().await.ok();
        Ok(())
    }

    pub async fn delete(&self, actor: Option<&Actor>, id: Uuid) -> Result<(), StoreError> {
        require_actor(actor)?;
        self.rows.delete(TABLE, &[Filter::eq("id", id)]).await?;
        self.store.refetch().await.ok();
        Ok(())
    }

    /// Applies a signed stock delta, refusing to drive the quantity negative.
    pub async fn adjust_stock(
        &self,
        actor: Option<&Actor>,
        id: Uuid,
        delta: i32,
    ) -> Result<i32, StoreError> {
        require_actor(actor)?;

        let filters = [Filter::eq("id", id)];
        let row = self
            .rows
            .select(TABLE, &filters, None)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Remote(format!("product {} not found", id)))?;
        let product: Product = serde_json::from_value(row)
            .map_err(|e| StoreError::Remote(format!("decode product failed: {}", e)))?;

        let new_quantity = product.stock_quantity + delta;
        if new_quantity < 0 {
            return Err(StoreError::Validation("stock cannot go negative".to_string()));
        }

        let patch = serde_json::json!({
            "stock_quantity": new_quantity,
            "updated_at": Utc::now(),
        });
        self.rows.update(TABLE, &filters, patch).await?;
        self.store.refetch().await.ok();
        Ok(new_quantity)
    }
}
