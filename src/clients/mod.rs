use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::finance::{ChargeStatus, PixCharge};
use crate::platform::{Filter, Order, RowStore};
use crate::sales::Sale;
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const TABLE: &str = "clients";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub document: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateClient {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub document: Option<String>,
    pub notes: Option<String>,
}

/// Purchases and outstanding charges for one client, scanned from the
/// sales and charge tables.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatement {
    pub sales: Vec<Sale>,
    pub charges: Vec<PixCharge>,
    pub total_purchases: BigDecimal,
    pub outstanding: BigDecimal,
}

pub struct ClientStore {
    store: ScopedStore<Client>,
    rows: Arc<dyn RowStore>,
}

impl ClientStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            store: ScopedStore::new(
                state,
                StoreSpec {
                    table: "clients",
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

    pub async fn clients(&self) -> Vec<Client> {
        self.store.snapshot().await
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub async fn search(&self, term: &str) -> Vec<Client> {
        let term = term.to_lowercase();
        self.store
            .snapshot()
            .await
            .into_iter()
            .filter(|c| c.name.to_lowercase().contains(&term))
            .collect()
    }

    pub async fn create(
        &self,
        actor: Option<&Actor>,
        name: &str,
        email: Option<String>,
        phone: Option<String>,
        document: Option<String>,
    ) -> Result<Client, StoreError> {
        require_actor(actor)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("client name is required".to_string()));
        }

        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.filter(|e| !e.trim().is_empty()),
            phone: phone.filter(|p| !p.trim().is_empty()),
            document: document.filter(|d| !d.trim().is_empty()),
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let row = serde_json::to_value(&client)
            .map_err(|e| StoreError::Remote(format!("encode client failed: {}", e)))?;
        self.rows.insert(TABLE, row).await?;
        self.store.refetch().await.ok();
        Ok(client)
    }

    pub async fn update(
        &self,
        actor: Option<&Actor>,
        id: Uuid,
        changes: UpdateClient,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;
        let mut patch = serde_json::Map::new();
        if let Some(name) = changes.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(StoreError::Validation("client name is required".to_string()));
            }
            patch.insert("name".to_string(), Value::String(name));
        }
        if let Some(email) = changes.email {
            patch.insert("email".to_string(), Value::String(email));
        }
        if let Some(phone) = changes.phone {
            patch.insert("phone".to_string(), Value::String(phone));
        }
        if let Some(document) = changes.document {
            patch.insert("document".to_string(), Value::String(document));
        }
        if let Some(notes) = changes.notes {
            patch.insert("notes".to_string(), Value::String(notes));
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

    /// Ledger view for one client: every sale plus open charges.
    pub async fn statement(&self, client_id: Uuid) -> Result<ClientStatement, StoreError> {
        let filters = [Filter::eq("client_id", client_id)];
        let sale_rows = self
            .rows
            .select(
                crate::sales::SALES_TABLE,
                &filters,
                Some(&Order::desc("created_at")),
            )
            .await?;
        let charge_rows = self
            .rows
            .select(
                crate::finance::CHARGES_TABLE,
                &filters,
                Some(&Order::desc("created_at")),
            )
            .await?;

        let mut sales: Vec<Sale> = Vec::with_capacity(sale_rows.len());
        for row in sale_rows {
            match serde_json::from_value(row) {
                Ok(sale) => sales.push(sale),
                Err(e) => warn!("dropping malformed sale row: {}", e),
            }
        }
        let mut charges: Vec<PixCharge> = Vec::with_capacity(charge_rows.len());
        for row in charge_rows {
            match serde_json::from_value(row) {
                Ok(charge) => charges.push(charge),
                Err(e) => warn!("dropping malformed charge row: {}", e),
            }
        }

        let total_purchases = sales
            .iter()
            .fold(BigDecimal::from(0), |acc, sale| acc + &sale.total);
        let outstanding = charges
            .iter()
            .filter(|c| c.status == ChargeStatus::Pending)
            .fold(BigDecimal::from(0), |acc, charge| acc + &charge.amount);

        Ok(ClientStatement {
            sales,
            charges,
            total_purchases,
            outstanding,
        })
    }
}
