//! Line item model for invoice-service.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One billable line under an invoice.
///
/// `line_total` is derived: the store recomputes it from `quantity` and
/// `unit_price` on every write, it is never accepted from a caller.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceDetail {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl InvoiceDetail {
    /// Derived monetary value for one line, decimal-exact.
    pub fn compute_line_total(quantity: i32, unit_price: Decimal) -> Decimal {
        Decimal::from(quantity) * unit_price
    }
}

/// Input for creating a detail under an invoice.
#[derive(Debug, Clone)]
pub struct CreateDetail {
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Partial update of a single detail. Unset fields keep their current value;
/// the line total is recomputed from the merged quantity and unit price.
#[derive(Debug, Clone, Default)]
pub struct UpdateDetail {
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub unit_price: Option<Decimal>,
}

/// One row of a detail list submitted with an invoice update. A known id
/// updates that row; no id creates a new one.
#[derive(Debug, Clone)]
pub struct DetailInput {
    pub id: Option<Uuid>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::InvoiceDetail;
    use rust_decimal_macros::dec;

    #[test]
    fn line_total_is_decimal_exact() {
        assert_eq!(InvoiceDetail::compute_line_total(2, dec!(10.00)), dec!(20.00));
        assert_eq!(InvoiceDetail::compute_line_total(3, dec!(0.10)), dec!(0.30));
        assert_eq!(InvoiceDetail::compute_line_total(0, dec!(99.99)), dec!(0.00));
    }

    #[test]
    fn line_total_keeps_two_decimal_places() {
        let total = InvoiceDetail::compute_line_total(7, dec!(1.01));
        assert_eq!(total.to_string(), "7.07");
    }
}
