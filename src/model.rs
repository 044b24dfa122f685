use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }
}

/// A line item as the invoice store returns it. Numeric fields are decimal
/// strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceItem {
    pub id: String,
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    #[serde(default)]
    pub tax_rate: Option<String>,
    #[serde(default)]
    pub discount: Option<String>,
    pub line_total: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub user_id: String,
    pub client_id: String,
    pub client_name: String,
    #[serde(default)]
    pub client_email: Option<String>,
    pub issue_date: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub status: InvoiceStatus,
    pub currency: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    pub subtotal: String,
    #[serde(default = "zero_amount")]
    pub tax_total: String,
    pub total: String,
    #[serde(default)]
    pub items: Vec<InvoiceItem>,
    /// Set on invoices produced by a recurring series.
    #[serde(default)]
    pub recurring_series_id: Option<String>,
    pub created_at: String,
}

fn zero_amount() -> String {
    "0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewInvoiceItem {
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    #[serde(default)]
    pub tax_rate: Option<String>,
    #[serde(default)]
    pub discount: Option<String>,
    pub line_total: String,
}

/// Input for `InvoiceStore::create_invoice_from_snapshot`. The store assigns
/// the id, the invoice number and the creation timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewInvoice {
    pub user_id: String,
    pub client_id: String,
    pub client_name: String,
    #[serde(default)]
    pub client_email: Option<String>,
    pub issue_date: String,
    #[serde(default)]
    pub due_date: Option<String>,
    pub status: InvoiceStatus,
    pub currency: String,
    pub notes: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    pub subtotal: String,
    pub tax_total: String,
    pub total: String,
    pub items: Vec<NewInvoiceItem>,
    #[serde(default)]
    pub recurring_series_id: Option<String>,
}
