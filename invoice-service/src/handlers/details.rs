//! Line item handlers, always scoped under a parent invoice.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::handlers::invoices::{validate_detail_fields, DetailPayload, DetailResponse};
use crate::models::{CreateDetail, UpdateDetail};
use crate::services::metrics::DETAILS_TOTAL;
use crate::startup::AppState;
use service_core::error::AppError;

/// Partial update of one line item.
#[derive(Debug, Deserialize)]
pub struct UpdateDetailRequest {
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub unit_price: Option<Decimal>,
}

/// List all details of an invoice.
///
/// GET /invoices/:id/details
pub async fn list_details(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Vec<DetailResponse>>, AppError> {
    let details = state.db.list_details(invoice_id).await?;
    Ok(Json(details.into_iter().map(DetailResponse::from).collect()))
}

/// Add a line item to an invoice.
///
/// POST /invoices/:id/details
pub async fn create_detail(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<DetailPayload>,
) -> Result<(StatusCode, Json<DetailResponse>), AppError> {
    validate_detail_fields(&req.description, req.quantity, req.unit_price)?;

    let input = CreateDetail {
        description: req.description,
        quantity: req.quantity,
        unit_price: req.unit_price,
    };
    let detail = state.db.add_detail(invoice_id, &input).await?;
    DETAILS_TOTAL.with_label_values(&["created"]).inc();

    Ok((StatusCode::CREATED, Json(DetailResponse::from(detail))))
}

/// Get one line item under the named invoice.
///
/// GET /invoices/:id/details/:detail_id
pub async fn get_detail(
    State(state): State<AppState>,
    Path((invoice_id, detail_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DetailResponse>, AppError> {
    let detail = state
        .db
        .get_detail(invoice_id, detail_id)
        .await?
        .ok_or_else(|| detail_not_found(invoice_id, detail_id))?;

    Ok(Json(DetailResponse::from(detail)))
}

/// Apply a partial update to one line item; the line total is recomputed.
///
/// PUT /invoices/:id/details/:detail_id
pub async fn update_detail(
    State(state): State<AppState>,
    Path((invoice_id, detail_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateDetailRequest>,
) -> Result<Json<DetailResponse>, AppError> {
    // Unset fields keep their stored value; valid placeholders stand in so
    // only the provided fields are actually checked.
    validate_detail_fields(
        req.description.as_deref().unwrap_or("-"),
        req.quantity.unwrap_or(0),
        req.unit_price.unwrap_or(Decimal::ZERO),
    )?;

    let input = UpdateDetail {
        description: req.description,
        quantity: req.quantity,
        unit_price: req.unit_price,
    };
    let detail = state
        .db
        .update_detail(invoice_id, detail_id, &input)
        .await?
        .ok_or_else(|| detail_not_found(invoice_id, detail_id))?;
    DETAILS_TOTAL.with_label_values(&["updated"]).inc();

    Ok(Json(DetailResponse::from(detail)))
}

/// Remove one line item under the named invoice.
///
/// DELETE /invoices/:id/details/:detail_id
pub async fn delete_detail(
    State(state): State<AppState>,
    Path((invoice_id, detail_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    if !state.db.delete_detail(invoice_id, detail_id).await? {
        return Err(detail_not_found(invoice_id, detail_id));
    }
    DETAILS_TOTAL.with_label_values(&["deleted"]).inc();

    Ok(StatusCode::NO_CONTENT)
}

fn detail_not_found(invoice_id: Uuid, detail_id: Uuid) -> AppError {
    AppError::NotFound(anyhow::anyhow!(
        "Detail {} not found on invoice {}",
        detail_id,
        invoice_id
    ))
}
