//! Invoice model for invoice-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{CreateDetail, DetailInput};

/// Invoice header row. Line items live in `invoice_details`; the invoice
/// total is always derived from them and never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub client_name: String,
    pub client_email: String,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Filter parameters for listing invoices.
///
/// Detail predicates match an invoice when any of its details satisfies the
/// predicate. The total-value bounds compare against the sum of the
/// invoice's line totals.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub invoice_number: Option<String>,
    pub client_name: Option<String>,
    pub due_after: Option<NaiveDate>,
    pub due_before: Option<NaiveDate>,
    pub detail_description: Option<String>,
    pub min_quantity: Option<i32>,
    pub max_quantity: Option<i32>,
    pub min_unit_price: Option<Decimal>,
    pub max_unit_price: Option<Decimal>,
    pub min_total_value: Option<Decimal>,
    pub max_total_value: Option<Decimal>,
}

/// Input for creating an invoice together with its details.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub invoice_number: String,
    pub client_name: String,
    pub client_email: String,
    pub due_date: NaiveDate,
    pub details: Vec<CreateDetail>,
}

/// Input for updating an invoice header, optionally reconciling its details.
///
/// When `details` is `None` the existing line items are left untouched. When
/// it is `Some`, rows carrying an id update the matching detail, rows without
/// an id are created, and existing details absent from the list are deleted.
#[derive(Debug, Clone)]
pub struct UpdateInvoice {
    pub invoice_number: String,
    pub client_name: String,
    pub client_email: String,
    pub due_date: NaiveDate,
    pub details: Option<Vec<DetailInput>>,
}
