//! Database service for invoice-service: durable storage and integrity
//! enforcement for invoices and their line items.

use crate::models::{
    CreateDetail, CreateInvoice, Invoice, InvoiceDetail, ListInvoicesFilter, UpdateDetail,
    UpdateInvoice,
};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const INVOICE_COLUMNS: &str = "id, invoice_number, client_name, client_email, due_date, created_at";
const DETAIL_COLUMNS: &str = "id, invoice_id, description, quantity, unit_price, line_total";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoice-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Create an invoice together with its details in one transaction.
    /// Either the header and every detail persist, or nothing does.
    #[instrument(skip(self, input), fields(invoice_number = %input.invoice_number))]
    pub async fn create_invoice(
        &self,
        input: &CreateInvoice,
    ) -> Result<(Invoice, Vec<InvoiceDetail>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice_id = Uuid::new_v4();
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (id, invoice_number, client_name, client_email, due_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, invoice_number, client_name, client_email, due_date, created_at
            "#,
        )
        .bind(invoice_id)
        .bind(&input.invoice_number)
        .bind(&input.client_name)
        .bind(&input.client_email)
        .bind(input.due_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| invoice_number_conflict(e, &input.invoice_number, "create invoice"))?;

        let mut details = Vec::with_capacity(input.details.len());
        for detail in &input.details {
            details.push(insert_detail(&mut tx, invoice_id, detail).await?);
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit invoice create: {}", e))
        })?;

        timer.observe_duration();

        info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            details = details.len(),
            "Invoice created"
        );

        Ok((invoice, details))
    }

    /// Get an invoice header by id.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Get an invoice with all of its details.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice_with_details(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<(Invoice, Vec<InvoiceDetail>)>, AppError> {
        let Some(invoice) = self.get_invoice(invoice_id).await? else {
            return Ok(None);
        };
        let details = self.fetch_details(invoice_id).await?;
        Ok(Some((invoice, details)))
    }

    /// List invoices matching the filter.
    ///
    /// Every predicate is NULL-guarded so a single statement serves all
    /// filter combinations. Detail predicates each use their own EXISTS
    /// subquery: an invoice matches when any of its details satisfies the
    /// predicate, and separate predicates may be satisfied by different
    /// details. The total-value bounds aggregate line totals per invoice
    /// before comparing.
    #[instrument(skip(self, filter))]
    pub async fn list_invoices(
        &self,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT i.id, i.invoice_number, i.client_name, i.client_email, i.due_date, i.created_at
            FROM invoices i
            WHERE ($1::varchar IS NULL OR i.invoice_number ILIKE '%' || $1 || '%')
              AND ($2::varchar IS NULL OR i.client_name ILIKE '%' || $2 || '%')
              AND ($3::date IS NULL OR i.due_date >= $3)
              AND ($4::date IS NULL OR i.due_date <= $4)
              AND ($5::varchar IS NULL OR EXISTS (
                    SELECT 1 FROM invoice_details d
                    WHERE d.invoice_id = i.id AND d.description ILIKE '%' || $5 || '%'))
              AND ($6::integer IS NULL OR EXISTS (
                    SELECT 1 FROM invoice_details d
                    WHERE d.invoice_id = i.id AND d.quantity >= $6))
              AND ($7::integer IS NULL OR EXISTS (
                    SELECT 1 FROM invoice_details d
                    WHERE d.invoice_id = i.id AND d.quantity <= $7))
              AND ($8::numeric IS NULL OR EXISTS (
                    SELECT 1 FROM invoice_details d
                    WHERE d.invoice_id = i.id AND d.unit_price >= $8))
              AND ($9::numeric IS NULL OR EXISTS (
                    SELECT 1 FROM invoice_details d
                    WHERE d.invoice_id = i.id AND d.unit_price <= $9))
              AND ($10::numeric IS NULL OR (
                    SELECT COALESCE(SUM(d.line_total), 0) FROM invoice_details d
                    WHERE d.invoice_id = i.id) >= $10)
              AND ($11::numeric IS NULL OR (
                    SELECT COALESCE(SUM(d.line_total), 0) FROM invoice_details d
                    WHERE d.invoice_id = i.id) <= $11)
            ORDER BY i.created_at, i.id
            "#,
        )
        .bind(&filter.invoice_number)
        .bind(&filter.client_name)
        .bind(filter.due_after)
        .bind(filter.due_before)
        .bind(&filter.detail_description)
        .bind(filter.min_quantity)
        .bind(filter.max_quantity)
        .bind(filter.min_unit_price)
        .bind(filter.max_unit_price)
        .bind(filter.min_total_value)
        .bind(filter.max_total_value)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Replace an invoice header and reconcile its details.
    ///
    /// Runs in one transaction. Returns `Ok(None)` when the invoice id is
    /// unknown. When a detail list is supplied: rows with a known id update
    /// that detail (the id must belong to this invoice), rows without an id
    /// are created, and existing details missing from the list are deleted.
    #[instrument(skip(self, input), fields(invoice_id = %invoice_id))]
    pub async fn update_invoice(
        &self,
        invoice_id: Uuid,
        input: &UpdateInvoice,
    ) -> Result<Option<(Invoice, Vec<InvoiceDetail>)>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices
            SET invoice_number = $2,
                client_name = $3,
                client_email = $4,
                due_date = $5
            WHERE id = $1
            RETURNING id, invoice_number, client_name, client_email, due_date, created_at
            "#,
        )
        .bind(invoice_id)
        .bind(&input.invoice_number)
        .bind(&input.client_name)
        .bind(&input.client_email)
        .bind(input.due_date)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| invoice_number_conflict(e, &input.invoice_number, "update invoice"))?;

        let Some(invoice) = invoice else {
            return Ok(None);
        };

        if let Some(ref rows) = input.details {
            let mut kept: Vec<Uuid> = Vec::with_capacity(rows.len());
            for row in rows {
                match row.id {
                    Some(detail_id) => {
                        let line_total =
                            InvoiceDetail::compute_line_total(row.quantity, row.unit_price);
                        let updated = sqlx::query_as::<_, InvoiceDetail>(
                            r#"
                            UPDATE invoice_details
                            SET description = $3,
                                quantity = $4,
                                unit_price = $5,
                                line_total = $6
                            WHERE invoice_id = $1 AND id = $2
                            RETURNING id, invoice_id, description, quantity, unit_price, line_total
                            "#,
                        )
                        .bind(invoice_id)
                        .bind(detail_id)
                        .bind(&row.description)
                        .bind(row.quantity)
                        .bind(row.unit_price)
                        .bind(line_total)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| {
                            AppError::DatabaseError(anyhow::anyhow!(
                                "Failed to update detail: {}",
                                e
                            ))
                        })?;

                        let detail = updated.ok_or_else(|| {
                            AppError::NotFound(anyhow::anyhow!(
                                "Detail {} not found on invoice {}",
                                detail_id,
                                invoice_id
                            ))
                        })?;
                        kept.push(detail.id);
                    }
                    None => {
                        let created = insert_detail(
                            &mut tx,
                            invoice_id,
                            &CreateDetail {
                                description: row.description.clone(),
                                quantity: row.quantity,
                                unit_price: row.unit_price,
                            },
                        )
                        .await?;
                        kept.push(created.id);
                    }
                }
            }

            // Details omitted from the submitted list are removed.
            sqlx::query("DELETE FROM invoice_details WHERE invoice_id = $1 AND id <> ALL($2)")
                .bind(invoice_id)
                .bind(&kept)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!(
                        "Failed to delete omitted details: {}",
                        e
                    ))
                })?;
        }

        let details = sqlx::query_as::<_, InvoiceDetail>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM invoice_details WHERE invoice_id = $1 ORDER BY id"
        ))
        .bind(invoice_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch details: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit invoice update: {}", e))
        })?;

        timer.observe_duration();

        info!(invoice_id = %invoice.id, "Invoice updated");

        Ok(Some((invoice, details)))
    }

    /// Delete an invoice; the foreign key cascades to its details so no
    /// orphaned detail ever survives. Returns `false` when no row matched,
    /// which a second delete of the same id will hit.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, invoice_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e))
            })?;

        timer.observe_duration();

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(invoice_id = %invoice_id, "Invoice deleted");
        }

        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Detail Operations
    // -------------------------------------------------------------------------

    /// List details of an invoice. Fails with `NotFound` when the parent
    /// invoice does not exist; details are never queryable without one.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn list_details(&self, invoice_id: Uuid) -> Result<Vec<InvoiceDetail>, AppError> {
        self.require_invoice(invoice_id).await?;
        self.fetch_details(invoice_id).await
    }

    /// Get a single detail scoped to its parent invoice.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, detail_id = %detail_id))]
    pub async fn get_detail(
        &self,
        invoice_id: Uuid,
        detail_id: Uuid,
    ) -> Result<Option<InvoiceDetail>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_detail"])
            .start_timer();

        let detail = sqlx::query_as::<_, InvoiceDetail>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM invoice_details WHERE invoice_id = $1 AND id = $2"
        ))
        .bind(invoice_id)
        .bind(detail_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get detail: {}", e)))?;

        timer.observe_duration();

        Ok(detail)
    }

    /// Add a detail under an existing invoice.
    #[instrument(skip(self, input), fields(invoice_id = %invoice_id))]
    pub async fn add_detail(
        &self,
        invoice_id: Uuid,
        input: &CreateDetail,
    ) -> Result<InvoiceDetail, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_detail"])
            .start_timer();

        self.require_invoice(invoice_id).await?;

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;
        let detail = insert_detail(&mut tx, invoice_id, input).await?;
        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit detail insert: {}", e))
        })?;

        timer.observe_duration();

        info!(detail_id = %detail.id, invoice_id = %invoice_id, "Detail added");

        Ok(detail)
    }

    /// Apply a partial update to one detail under the named invoice. The new
    /// line total is recomputed from the merged quantity and unit price.
    /// `Ok(None)` when the detail does not resolve under this parent.
    #[instrument(skip(self, input), fields(invoice_id = %invoice_id, detail_id = %detail_id))]
    pub async fn update_detail(
        &self,
        invoice_id: Uuid,
        detail_id: Uuid,
        input: &UpdateDetail,
    ) -> Result<Option<InvoiceDetail>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_detail"])
            .start_timer();

        let Some(current) = self.get_detail(invoice_id, detail_id).await? else {
            return Ok(None);
        };

        let quantity = input.quantity.unwrap_or(current.quantity);
        let unit_price = input.unit_price.unwrap_or(current.unit_price);
        let line_total = InvoiceDetail::compute_line_total(quantity, unit_price);

        let detail = sqlx::query_as::<_, InvoiceDetail>(
            r#"
            UPDATE invoice_details
            SET description = COALESCE($3, description),
                quantity = $4,
                unit_price = $5,
                line_total = $6
            WHERE invoice_id = $1 AND id = $2
            RETURNING id, invoice_id, description, quantity, unit_price, line_total
            "#,
        )
        .bind(invoice_id)
        .bind(detail_id)
        .bind(&input.description)
        .bind(quantity)
        .bind(unit_price)
        .bind(line_total)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update detail: {}", e)))?;

        timer.observe_duration();

        Ok(detail)
    }

    /// Remove one detail under the named invoice.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, detail_id = %detail_id))]
    pub async fn delete_detail(&self, invoice_id: Uuid, detail_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_detail"])
            .start_timer();

        let result = sqlx::query("DELETE FROM invoice_details WHERE invoice_id = $1 AND id = $2")
            .bind(invoice_id)
            .bind(detail_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete detail: {}", e))
            })?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_details(&self, invoice_id: Uuid) -> Result<Vec<InvoiceDetail>, AppError> {
        let details = sqlx::query_as::<_, InvoiceDetail>(&format!(
            "SELECT {DETAIL_COLUMNS} FROM invoice_details WHERE invoice_id = $1 ORDER BY id"
        ))
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch details: {}", e)))?;

        Ok(details)
    }

    async fn require_invoice(&self, invoice_id: Uuid) -> Result<Invoice, AppError> {
        self.get_invoice(invoice_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
        })
    }
}

/// Insert one detail row inside an open transaction, deriving its line total.
async fn insert_detail(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    invoice_id: Uuid,
    input: &CreateDetail,
) -> Result<InvoiceDetail, AppError> {
    let line_total = InvoiceDetail::compute_line_total(input.quantity, input.unit_price);

    let detail = sqlx::query_as::<_, InvoiceDetail>(
        r#"
        INSERT INTO invoice_details (id, invoice_id, description, quantity, unit_price, line_total)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, invoice_id, description, quantity, unit_price, line_total
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(invoice_id)
    .bind(&input.description)
    .bind(input.quantity)
    .bind(input.unit_price)
    .bind(line_total)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert detail: {}", e)))?;

    Ok(detail)
}

/// Map a unique-index violation on `invoice_number` to a conflict; the
/// database index is the arbiter for concurrent writers racing on the same
/// number.
fn invoice_number_conflict(e: sqlx::Error, invoice_number: &str, op: &str) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => AppError::Conflict(
            anyhow::anyhow!("invoice_number '{}' already exists", invoice_number),
        ),
        _ => AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", op, e)),
    }
}
