use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::platform::{Filter, Order, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const EXPENSES_TABLE: &str = "expenses";
pub const CASH_FLOW_TABLE: &str = "cash_flow";
pub const CHARGES_TABLE: &str = "pix_charges";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Inflow,
    Outflow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowEntry {
    pub id: Uuid,
    pub kind: FlowKind,
    pub description: String,
    pub amount: BigDecimal,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub description: String,
    pub category: Option<String>,
    pub amount: BigDecimal,
    pub due_date: Option<NaiveDate>,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Pending,
    Paid,
    Expired,
}

/// Instant-payment charge presented to a client as a copy-paste code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixCharge {
    pub id: Uuid,
    pub client_id: Option<Uuid>,
    pub amount: BigDecimal,
    pub txid: Option<String>,
    pub status: ChargeStatus,
    pub qr_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

fn bd(val: f64) -> BigDecimal {
    BigDecimal::from_str(&val.to_string()).unwrap_or_else(|_| BigDecimal::from(0))
}

/// Annex write shared by sales and expenses: failures are logged, never
/// propagated, the primary operation stands on its own.
pub(crate) async fn record_cash_flow(
    rows: &Arc<dyn RowStore>,
    kind: FlowKind,
    description: &str,
    amount: BigDecimal,
    reference_type: &str,
    reference_id: Uuid,
) {
    let entry = CashFlowEntry {
        id: Uuid::new_v4(),
        kind,
        description: description.to_string(),
        amount,
        reference_type: Some(reference_type.to_string()),
        reference_id: Some(reference_id),
        created_at: Utc::now(),
    };
    let row = match serde_json::to_value(&entry) {
        Ok(row) => row,
        Err(e) => {
            warn!("cash flow entry not encodable: {}", e);
            return;
        }
    };
    if let Err(e) = rows.insert(CASH_FLOW_TABLE, row).await {
        warn!(
            "cash flow write for {} {} failed: {}",
            reference_type, reference_id, e
        );
    }
}

pub struct FinanceStore {
    expenses: ScopedStore<Expense>,
    cash_flow: ScopedStore<CashFlowEntry>,
    charges: ScopedStore<PixCharge>,
    rows: Arc<dyn RowStore>,
}

impl FinanceStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            expenses: ScopedStore::new(
                state,
                StoreSpec {
                    table: "expenses",
                    scope_column: None,
                    order: Some(Order::desc("created_at")),
                    live: LivePolicy::None,
                },
            ),
            cash_flow: ScopedStore::new(
                state,
                StoreSpec {
                    table: "cash_flow",
                    scope_column: None,
                    order: Some(Order::desc("created_at")),
                    live: LivePolicy::None,
                },
            ),
            charges: ScopedStore::new(
                state,
                StoreSpec {
                    table: "pix_charges",
                    scope_column: None,
                    order: Some(Order::desc("created_at")),
                    live: LivePolicy::None,
                },
            ),
            rows: Arc::clone(&state.rows),
        }
    }

    pub async fn load_expenses(&self) -> Result<(), StoreError> {
        self.expenses.activate(None).await
    }

    pub async fn expenses(&self) -> Vec<Expense> {
        self.expenses.snapshot().await
    }

    pub async fn load_cash_flow(&self) -> Result<(), StoreError> {
        self.cash_flow.activate(None).await
    }

    pub async fn cash_flow(&self) -> Vec<CashFlowEntry> {
        self.cash_flow.snapshot().await
    }

    pub async fn load_charges(&self) -> Result<(), StoreError> {
        self.charges.activate(None).await
    }

    pub async fn charges(&self) -> Vec<PixCharge> {
        self.charges.snapshot().await
    }

    /// (inflow, outflow, net) over the mirrored cash-flow entries.
    pub async fn totals(&self) -> (BigDecimal, BigDecimal, BigDecimal) {
        let mut inflow = BigDecimal::from(0);
        let mut outflow = BigDecimal::from(0);
        for entry in self.cash_flow.snapshot().await {
            match entry.kind {
                FlowKind::Inflow => inflow = inflow + &entry.amount,
                FlowKind::Outflow => outflow = outflow + &entry.amount,
            }
        }
        let net = &inflow - &outflow;
        (inflow, outflow, net)
    }

    pub async fn add_expense(
        &self,
        actor: Option<&Actor>,
        description: &str,
        category: Option<String>,
        amount: f64,
        due_date: Option<NaiveDate>,
    ) -> Result<Expense, StoreError> {
        require_actor(actor)?;
        let description = description.trim();
        if description.is_empty() {
            return Err(StoreError::Validation(
                "expense description is required".to_string(),
            ));
        }
        if amount < 0.0 {
            return Err(StoreError::Validation("amount cannot be negative".to_string()));
        }

        let expense = Expense {
            id: Uuid::new_v4(),
            description: description.to_string(),
            category,
            amount: bd(amount),
            due_date,
            is_paid: false,
            created_at: Utc::now(),
        };
        let row = serde_json::to_value(&expense)
            .map_err(|e| StoreError::Remote(format!("encode expense failed: {}", e)))?;
        self.rows.insert(EXPENSES_TABLE, row).await?;
        self.expenses.refetch().await.ok();
        Ok(expense)
    }

    /// Marks the expense paid and annexes the matching outflow entry.
    pub async fn mark_expense_paid(
        &self,
        actor: Option<&Actor>,
        id: Uuid,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;

        let filters = [Filter::eq("id", id)];
        let row = self
            .rows
            .select(EXPENSES_TABLE, &filters, None)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Remote(format!("expense {} not found", id)))?;
        let expense: Expense = serde_json::from_value(row)
            .map_err(|e| StoreError::Remote(format!("decode expense failed: {}", e)))?;
        if expense.is_paid {
            return Ok(());
        }

        let patch = serde_json::json!({ "is_paid": true });
        self.rows.update(EXPENSES_TABLE, &filters, patch).await?;

        record_cash_flow(
            &self.rows,
            FlowKind::Outflow,
            &expense.description,
            expense.amount.clone(),
            "expense",
            expense.id,
        )
        .await;

        self.expenses.refetch().await.ok();
        self.cash_flow.refetch().await.ok();
        Ok(())
    }

    pub async fn create_charge(
        &self,
        actor: Option<&Actor>,
        client_id: Option<Uuid>,
        amount: f64,
    ) -> Result<PixCharge, StoreError> {
        require_actor(actor)?;
        if amount <= 0.0 {
            return Err(StoreError::Validation(
                "charge amount must be positive".to_string(),
            ));
        }

        let charge = PixCharge {
            id: Uuid::new_v4(),
            client_id,
            amount: bd(amount),
            txid: None,
            status: ChargeStatus::Pending,
            qr_code: None,
            created_at: Utc::now(),
            paid_at: None,
        };
        let row = serde_json::to_value(&charge)
            .map_err(|e| StoreError::Remote(format!("encode charge failed: {}", e)))?;
        self.rows.insert(CHARGES_TABLE, row).await?;
        self.charges.refetch().await.ok();
        Ok(charge)
    }

    /// Settles a pending charge and annexes the inflow entry.
    pub async fn mark_charge_paid(
        &self,
        actor: Option<&Actor>,
        id: Uuid,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;

        let filters = [Filter::eq("id", id)];
        let row = self
            .rows
            .select(CHARGES_TABLE, &filters, None)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Remote(format!("charge {} not found", id)))?;
        let charge: PixCharge = serde_json::from_value(row)
            .map_err(|e| StoreError::Remote(format!("decode charge failed: {}", e)))?;
        if charge.status == ChargeStatus::Paid {
            return Ok(());
        }

        let patch = serde_json::json!({
            "status": ChargeStatus::Paid,
            "paid_at": Utc::now(),
        });
        self.rows.update(CHARGES_TABLE, &filters, patch).await?;

        record_cash_flow(
            &self.rows,
            FlowKind::Inflow,
            "pix charge settled",
            charge.amount.clone(),
            "pix_charge",
            charge.id,
        )
        .await;

        self.charges.refetch().await.ok();
        self.cash_flow.refetch().await.ok();
        Ok(())
    }

    pub async fn expire_charge(&self, actor: Option<&Actor>, id: Uuid) -> Result<(), StoreError> {
        require_actor(actor)?;
        let patch = serde_json::json!({ "status": ChargeStatus::Expired });
        self.rows
            .update(CHARGES_TABLE, &[Filter::eq("id", id)], patch)
            .await?;
        self.charges.refetch().await.ok();
        Ok(())
    }
}
