//! Notas fiscais and the invoice-scan function client.

use std::str::FromStr;
use std::sync::Arc;

use base64::Engine as _;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{require_actor, Actor};
use crate::config::AppConfig;
use crate::platform::{Filter, Order, RowStore};
use crate::shared::error::StoreError;
use crate::shared::state::AppState;
use crate::store::{LivePolicy, ScopedStore, StoreSpec};

pub const NOTAS_TABLE: &str = "notas_fiscais";
pub const ITEMS_TABLE: &str = "nota_fiscal_items";

/// Documents larger than this are rejected before the function is called.
pub const MAX_SCAN_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotaStatus {
    Draft,
    Issued,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotaFiscal {
    pub id: Uuid,
    pub number: Option<String>,
    pub client_id: Option<Uuid>,
    pub status: NotaStatus,
    pub total: BigDecimal,
    pub issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotaFiscalItem {
    pub id: Uuid,
    pub nota_id: Uuid,
    pub description: String,
    pub quantity: f64,
    pub unit_price: BigDecimal,
    pub total: BigDecimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNotaItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
}

fn bd(val: f64) -> BigDecimal {
    BigDecimal::from_str(&val.to_string()).unwrap_or_else(|_| BigDecimal::from(0))
}

pub struct InvoiceStore {
    notas: ScopedStore<NotaFiscal>,
    items: ScopedStore<NotaFiscalItem>,
    rows: Arc<dyn RowStore>,
}

impl InvoiceStore {
    pub fn new(state: &Arc<AppState>) -> Self {
        Self {
            notas: ScopedStore::new(
                state,
                StoreSpec {
                    table: "notas_fiscais",
                    scope_column: None,
                    order: Some(Order::desc("created_at")),
                    live: LivePolicy::None,
                },
            ),
            items: ScopedStore::new(
                state,
                StoreSpec {
                    table: "nota_fiscal_items",
                    scope_column: Some("nota_id"),
                    order: Some(Order::asc("id")),
                    live: LivePolicy::None,
                },
            ),
            rows: Arc::clone(&state.rows),
        }
    }

    pub async fn load(&self) -> Result<(), StoreError> {
        self.notas.activate(None).await
    }

    pub async fn notas(&self) -> Vec<NotaFiscal> {
        self.notas.snapshot().await
    }

    pub fn is_loading(&self) -> bool {
        self.notas.is_loading()
    }

    pub async fn open_nota(&self, nota: Option<Uuid>) -> Result<(), StoreError> {
        self.items.activate(nota).await
    }

    pub async fn items(&self) -> Vec<NotaFiscalItem> {
        self.items.snapshot().await
    }

    /// Drafts a nota with its line items (often seeded from an invoice scan).
    pub async fn create_draft(
        &self,
        actor: Option<&Actor>,
        client_id: Option<Uuid>,
        items: Vec<NewNotaItem>,
    ) -> Result<NotaFiscal, StoreError> {
        require_actor(actor)?;
        if items.is_empty() {
            return Err(StoreError::Validation("nota has no items".to_string()));
        }
        for item in &items {
            if item.description.trim().is_empty() {
                return Err(StoreError::Validation(
                    "item description is required".to_string(),
                ));
            }
            if item.quantity <= 0.0 {
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

        let total = items
            .iter()
            .map(|item| bd(item.unit_price) * bd(item.quantity))
            .fold(BigDecimal::from(0), |acc, line| acc + line);

        let nota = NotaFiscal {
            id: Uuid::new_v4(),
            number: None,
            client_id,
            status: NotaStatus::Draft,
            total,
            issued_at: None,
            created_at: Utc::now(),
        };
        let row = serde_json::to_value(&nota)
            .map_err(|e| StoreError::Remote(format!("encode nota failed: {}", e)))?;
        self.rows.insert(NOTAS_TABLE, row).await?;

        for item in &items {
            let nota_item = NotaFiscalItem {
                id: Uuid::new_v4(),
                nota_id: nota.id,
                description: item.description.trim().to_string(),
                quantity: item.quantity,
                unit_price: bd(item.unit_price),
                total: bd(item.unit_price) * bd(item.quantity),
            };
            let row = serde_json::to_value(&nota_item)
                .map_err(|e| StoreError::Remote(format!("encode nota item failed: {}", e)))?;
            self.rows.insert(ITEMS_TABLE, row).await?;
        }

        self.notas.refetch().await.ok();
        Ok(nota)
    }

    pub async fn issue(
        &self,
        actor: Option<&Actor>,
        id: Uuid,
        number: &str,
    ) -> Result<(), StoreError> {
        require_actor(actor)?;
        let number = number.trim();
        if number.is_empty() {
            return Err(StoreError::Validation("nota number is required".to_string()));
        }
        let patch = serde_json::json!({
            "number": number,
            "status": NotaStatus::Issued,
            "issued_at": Utc::now(),
        });
        self.rows
            .update(NOTAS_TABLE, &[Filter::eq("id", id)], patch)
            .await?;
        self.notas.refetch().await.ok();
        Ok(())
    }

    pub async fn cancel(&self, actor: Option<&Actor>, id: Uuid) -> Result<(), StoreError> {
        require_actor(actor)?;
        let patch = serde_json::json!({ "status": NotaStatus::Cancelled });
        self.rows
            .update(NOTAS_TABLE, &[Filter::eq("id", id)], patch)
            .await?;
        self.notas.refetch().await.ok();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFileType {
    Pdf,
    Png,
    Jpeg,
}

impl ScanFileType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(Self::Pdf),
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }
}

/// Line item extracted by the serverless scan function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub name: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub category: Option<String>,
}

impl ExtractedItem {
    pub fn into_nota_item(self) -> NewNotaItem {
        NewNotaItem {
            description: self.name,
            quantity: self.quantity,
            unit_price: self.unit_price,
        }
    }
}

/// Client for the invoice-OCR function endpoint.
pub struct InvoiceScanner {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl InvoiceScanner {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.functions.ocr_url.clone(),
            api_key: config.platform.api_key.clone(),
        }
    }

    /// Sends the document for extraction. Type and size are checked here,
    /// before anything goes on the wire.
    pub async fn scan(&self, bytes: &[u8], mime: &str) -> Result<Vec<ExtractedItem>, StoreError> {
        let file_type = ScanFileType::from_mime(mime).ok_or_else(|| {
            StoreError::Validation(format!("unsupported file type: {}", mime))
        })?;
        if bytes.len() > MAX_SCAN_BYTES {
            return Err(StoreError::Validation(
                "file exceeds the 10 MB scan limit".to_string(),
            ));
        }

        let payload = serde_json::json!({
            "file": base64::engine::general_purpose::STANDARD.encode(bytes),
            "file_type": file_type.as_str(),
        });
        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("invoice scan failed: {}", e)))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Remote(format!("invoice scan returned bad payload: {}", e)))?;
        if let Some(message) = body.get("error").and_then(|v| v.as_str()) {
            return Err(StoreError::Remote(format!("invoice scan failed: {}", message)));
        }
        if !status.is_success() {
            return Err(StoreError::Remote(format!(
                "invoice scan failed: HTTP {}",
                status
            )));
        }

        let items = body
            .get("items")
            .cloned()
            .ok_or_else(|| StoreError::Remote("invoice scan returned no items".to_string()))?;
        serde_json::from_value(items)
            .map_err(|e| StoreError::Remote(format!("invoice scan returned bad items: {}", e)))
    }
}
