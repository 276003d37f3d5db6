use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::finance::{record_cash_flow, FlowKind};
use crate::platform::{Filter, Order, RowStore};
use crate::products::Product;
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const SALES_TABLE: &str = "sales";
pub const ITEMS_TABLE: &str = "sale_items";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub client_id: Option<Uuid>,
    pub total: BigDecimal,
    pub discount: BigDecimal,
    pub payment_method: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub subtotal: BigDecimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSaleItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: f64,
}

fn bd(val: f64) -> BigDecimal {
    BigDecimal::from_str(&val.to_string()).unwrap_or_else(|_| BigDecimal::from(0))
}

/// Point-of-sale checkout and sale history.
pub struct SaleStore {
    sales: ScopedStore<Sale>,
    items: ScopedStore<SaleItem>,
    rows: Arc<dyn RowStore>,
}

impl SaleStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            sales: ScopedStore::new(
                state,
                StoreSpec {
                    table: "sales",
                    scope_column: None,
                    order: Some(Order::desc("created_at")),
                    live: LivePolicy::None,
                },
            ),
            items: ScopedStore::new(
                state,
                StoreSpec {
                    table: "sale_items",
                    scope_column: Some("sale_id"),
                    order: Some(Order::asc("id")),
                    live: LivePolicy::None,
                },
            ),
            rows: Arc::clone(&state.rows),
        }
    }

    pub async fn load(&self) -> Result<(), StoreError> {
        self.sales.activate(None).await
    }

    pub async fn sales(&self) -> Vec<Sale> {
        self.sales.snapshot().await
    }

    pub fn is_loading(&self) -> bool {
        self.sales.is_loading()
    }

    pub async fn open_sale(&self, sale: Option<Uuid>) -> Result<(), StoreError> {
        self.items.activate(sale).await
    }

    pub async fn items(&self) -> Vec<SaleItem> {
        self.items.snapshot().await
    }

    /// Completes a sale: one sale row, one row per item, a stock decrement
    /// per product, and a best-effort cash-flow inflow. The writes are
    /// sequential and independent; there is no transaction spanning them.
    pub async fn checkout(
        &self,
        actor: Option<&Actor>,
        client_id: Option<Uuid>,
        items: Vec<NewSaleItem>,
        discount: f64,
        payment_method: &str,
    ) -> Result<Sale, StoreError> {
        let actor = require_actor(actor)?;
        if items.is_empty() {
            return Err(StoreError::Validation("sale has no items".to_string()));
        }
        if discount < 0.0 {
            return Err(StoreError::Validation("discount cannot be negative".to_string()));
        }
        for item in &items {
            if item.quantity <= 0 {
                return Err(StoreError::Validation(
                    "item quantity must be positive".to_string(),
                ));
            }
            if item.unit_price < 0.0 {
                return Err(StoreError::Validation(
                    "item price cannot be negative".to_string(),
                ));
            }
        }

        // Check stock up front so an obviously short sale never starts
        // writing. Concurrent sales can still race past this; the platform
        // does not hand us a transaction to close that window.
        let mut stocked: Vec<(Product, i32)> = Vec::with_capacity(items.len());
        for item in &items {
            let filters = [Filter::eq("id", item.product_id)];
            let row = self
                .rows
                .select(crate::products::TABLE, &filters, None)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    StoreError::Remote(format!("product {} not found", item.product_id))
                })?;
            let product: Product = serde_json::from_value(row)
                .map_err(|e| StoreError::Remote(format!("decode product failed: {}", e)))?;
            if product.stock_quantity < item.quantity {
                return Err(StoreError::Validation(format!(
                    "not enough stock for {}",
                    product.name
                )));
            }
            stocked.push((product, item.quantity));
        }

        let gross = items
            .iter()
            .map(|item| bd(item.unit_price) * BigDecimal::from(item.quantity))
            .fold(BigDecimal::from(0), |acc, line| acc + line);
        let discount = bd(discount);
        if discount > gross {
            return Err(StoreError::Validation(
                "discount exceeds the sale total".to_string(),
            ));
        }
        let total = &gross - &discount;

        let sale = Sale {
            id: Uuid::new_v4(),
            client_id,
            total: total.clone(),
            discount,
            payment_method: payment_method.to_string(),
            created_by: actor.id,
            created_at: Utc::now(),
        };
        let row = serde_json::to_value(&sale)
            .map_err(|e| StoreError::Remote(format!("encode sale failed: {}", e)))?;
        self.rows.insert(SALES_TABLE, row).await?;

        for item in &items {
            let sale_item = SaleItem {
                id: Uuid::new_v4(),
                sale_id: sale.id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: bd(item.unit_price),
                subtotal: bd(item.unit_price) * BigDecimal::from(item.quantity),
            };
            let row = serde_json::to_value(&sale_item)
                .map_err(|e| StoreError::Remote(format!("encode sale item failed: {}", e)))?;
            self.rows.insert(ITEMS_TABLE, row).await?;
        }

        for (product, quantity) in &stocked {
            let patch = serde_json::json!({
                "stock_quantity": product.stock_quantity - quantity,
                "updated_at": Utc::now(),
            });
            self.rows
                .update(
                    crate::products::TABLE,
                    &[Filter::eq("id", product.id)],
                    patch,
                )
                .await?;
        }

        record_cash_flow(
            &self.rows,
            FlowKind::Inflow,
            &format!("sale {}", sale.id),
            total,
            "sale",
            sale.id,
        )
        .await;

        self.sales.refetch().await.ok();
        Ok(sale)
    }
}
