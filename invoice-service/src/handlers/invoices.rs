//! Invoice CRUD handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    CreateDetail, CreateInvoice, DetailInput, Invoice, InvoiceDetail, ListInvoicesFilter,
    UpdateInvoice,
};
use crate::services::metrics::INVOICES_TOTAL;
use crate::startup::AppState;
use crate::utils::ValidatedJson;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// One line item as submitted by a caller. `line_total` is never accepted;
/// the store derives it. An `id` is only meaningful on invoice updates,
/// where it selects the existing detail to overwrite.
#[derive(Debug, Clone, Deserialize)]
pub struct DetailPayload {
    pub id: Option<Uuid>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Request to create an invoice, optionally with its line items.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    #[validate(length(min = 1, max = 50, message = "invoice_number must be 1-50 characters"))]
    pub invoice_number: String,
    #[validate(length(min = 1, max = 255, message = "client_name is required"))]
    pub client_name: String,
    #[validate(email(message = "client_email must be a valid email address"))]
    pub client_email: String,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub details: Vec<DetailPayload>,
}

/// Request to replace an invoice header and, when `details` is present,
/// reconcile its line items.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateInvoiceRequest {
    #[validate(length(min = 1, max = 50, message = "invoice_number must be 1-50 characters"))]
    pub invoice_number: String,
    #[validate(length(min = 1, max = 255, message = "client_name is required"))]
    pub client_name: String,
    #[validate(email(message = "client_email must be a valid email address"))]
    pub client_email: String,
    pub due_date: NaiveDate,
    pub details: Option<Vec<DetailPayload>>,
}

/// Query parameters accepted by the invoice listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
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
    #[serde(default)]
    pub include_details: bool,
}

impl From<&ListQuery> for ListInvoicesFilter {
    fn from(query: &ListQuery) -> Self {
        ListInvoicesFilter {
            invoice_number: query.invoice_number.clone(),
            client_name: query.client_name.clone(),
            due_after: query.due_after,
            due_before: query.due_before,
            detail_description: query.detail_description.clone(),
            min_quantity: query.min_quantity,
            max_quantity: query.max_quantity,
            min_unit_price: query.min_unit_price,
            max_unit_price: query.max_unit_price,
            min_total_value: query.min_total_value,
            max_total_value: query.max_total_value,
        }
    }
}

/// Line item response.
#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub id: Uuid,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<InvoiceDetail> for DetailResponse {
    fn from(detail: InvoiceDetail) -> Self {
        Self {
            id: detail.id,
            description: detail.description,
            quantity: detail.quantity,
            unit_price: detail.unit_price,
            line_total: detail.line_total,
        }
    }
}

/// Invoice response. Single-invoice responses embed the details and the
/// derived total; list responses carry header fields only unless
/// `include_details` is set.
#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub client_name: String,
    pub client_email: String,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<DetailResponse>>,
}

impl InvoiceResponse {
    pub fn with_details(invoice: Invoice, details: Vec<InvoiceDetail>) -> Self {
        let total = details.iter().map(|d| d.line_total).sum::<Decimal>();
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            client_name: invoice.client_name,
            client_email: invoice.client_email,
            due_date: invoice.due_date,
            created_at: invoice.created_at,
            total: Some(total),
            details: Some(details.into_iter().map(DetailResponse::from).collect()),
        }
    }

    pub fn header_only(invoice: Invoice) -> Self {
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            client_name: invoice.client_name,
            client_email: invoice.client_email,
            due_date: invoice.due_date,
            created_at: invoice.created_at,
            total: None,
            details: None,
        }
    }
}

// ============================================================================
// Validation helpers
// ============================================================================

/// Field checks the derive macro cannot express for line items: required
/// description, non-negative quantity, and a non-negative money amount with
/// at most 2 decimal places.
pub(crate) fn validate_detail_fields(
    description: &str,
    quantity: i32,
    unit_price: Decimal,
) -> Result<(), AppError> {
    let mut errors = validator::ValidationErrors::new();

    if description.trim().is_empty() {
        errors.add("description", field_error("description is required"));
    }
    if quantity < 0 {
        errors.add(
            "quantity",
            field_error("quantity must be greater than or equal to 0"),
        );
    }
    if unit_price < Decimal::ZERO {
        errors.add(
            "unit_price",
            field_error("unit_price must be greater than or equal to 0"),
        );
    } else if unit_price.normalize().scale() > 2 {
        errors.add(
            "unit_price",
            field_error("unit_price must have at most 2 decimal places"),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::ValidationError(errors))
    }
}

fn field_error(message: &'static str) -> validator::ValidationError {
    let mut error = validator::ValidationError::new("invalid");
    error.message = Some(message.into());
    error
}

fn validate_details(details: &[DetailPayload]) -> Result<(), AppError> {
    for detail in details {
        validate_detail_fields(&detail.description, detail.quantity, detail.unit_price)?;
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// List invoices, optionally filtered.
///
/// GET /invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<InvoiceResponse>>, AppError> {
    let filter = ListInvoicesFilter::from(&query);
    let invoices = state.db.list_invoices(&filter).await?;

    let mut items = Vec::with_capacity(invoices.len());
    if query.include_details {
        for invoice in invoices {
            let details = state.db.list_details(invoice.id).await?;
            items.push(InvoiceResponse::with_details(invoice, details));
        }
    } else {
        items.extend(invoices.into_iter().map(InvoiceResponse::header_only));
    }

    Ok(Json(items))
}

/// Create an invoice with zero or more line items.
///
/// POST /invoices
pub async fn create_invoice(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    validate_details(&req.details)?;

    let input = CreateInvoice {
        invoice_number: req.invoice_number,
        client_name: req.client_name,
        client_email: req.client_email,
        due_date: req.due_date,
        details: req
            .details
            .into_iter()
            .map(|d| CreateDetail {
                description: d.description,
                quantity: d.quantity,
                unit_price: d.unit_price,
            })
            .collect(),
    };

    let (invoice, details) = state.db.create_invoice(&input).await?;
    INVOICES_TOTAL.with_label_values(&["created"]).inc();

    Ok((
        StatusCode::CREATED,
        Json(InvoiceResponse::with_details(invoice, details)),
    ))
}

/// Get one invoice with its details.
///
/// GET /invoices/:id
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let (invoice, details) = state
        .db
        .get_invoice_with_details(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", id)))?;

    Ok(Json(InvoiceResponse::with_details(invoice, details)))
}

/// Replace an invoice header and reconcile its details.
///
/// PUT /invoices/:id
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateInvoiceRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    if let Some(ref details) = req.details {
        validate_details(details)?;
    }

    let input = UpdateInvoice {
        invoice_number: req.invoice_number,
        client_name: req.client_name,
        client_email: req.client_email,
        due_date: req.due_date,
        details: req.details.map(|rows| {
            rows.into_iter()
                .map(|d| DetailInput {
                    id: d.id,
                    description: d.description,
                    quantity: d.quantity,
                    unit_price: d.unit_price,
                })
                .collect()
        }),
    };

    let (invoice, details) = state
        .db
        .update_invoice(id, &input)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", id)))?;
    INVOICES_TOTAL.with_label_values(&["updated"]).inc();

    Ok(Json(InvoiceResponse::with_details(invoice, details)))
}

/// Delete an invoice; its details are removed with it.
///
/// DELETE /invoices/:id
pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.db.delete_invoice(id).await? {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Invoice {} not found",
            id
        )));
    }
    INVOICES_TOTAL.with_label_values(&["deleted"]).inc();

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_quantity_names_the_field() {
        let err = validate_detail_fields("Widget", -1, dec!(10.00)).unwrap_err();
        assert!(err.to_string().contains("quantity"));
    }

    #[test]
    fn negative_unit_price_names_the_field() {
        let err = validate_detail_fields("Widget", 1, dec!(-0.01)).unwrap_err();
        assert!(err.to_string().contains("unit_price"));
    }

    #[test]
    fn unit_price_with_more_than_two_decimals_is_rejected() {
        assert!(validate_detail_fields("Widget", 1, dec!(1.001)).is_err());
        // Trailing zeros beyond two places are not an error.
        assert!(validate_detail_fields("Widget", 1, dec!(1.100)).is_ok());
    }

    #[test]
    fn blank_description_is_rejected() {
        let err = validate_detail_fields("   ", 1, dec!(1.00)).unwrap_err();
        assert!(err.to_string().contains("description"));
    }

    #[test]
    fn valid_detail_passes() {
        assert!(validate_detail_fields("Widget", 0, dec!(0.00)).is_ok());
        assert!(validate_detail_fields("Widget", 2, dec!(10.00)).is_ok());
    }

    #[test]
    fn invalid_email_fails_derive_validation() {
        let req = CreateInvoiceRequest {
            invoice_number: "INV-1".to_string(),
            client_name: "Acme".to_string(),
            client_email: "not-an-email".to_string(),
            due_date: chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            details: vec![],
        };
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("client_email"));
    }

    #[test]
    fn empty_invoice_number_fails_derive_validation() {
        let req = CreateInvoiceRequest {
            invoice_number: String::new(),
            client_name: "Acme".to_string(),
            client_email: "a@acme.com".to_string(),
            due_date: chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            details: vec![],
        };
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("invoice_number"));
    }

    #[test]
    fn list_query_maps_to_filter() {
        let query = ListQuery {
            invoice_number: Some("INV".to_string()),
            min_total_value: Some(dec!(100.00)),
            include_details: true,
            ..Default::default()
        };
        let filter = ListInvoicesFilter::from(&query);
        assert_eq!(filter.invoice_number.as_deref(), Some("INV"));
        assert_eq!(filter.min_total_value, Some(dec!(100.00)));
        assert!(filter.client_name.is_none());
    }
}
