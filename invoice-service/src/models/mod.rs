//! Domain models for invoice-service.

mod invoice;
mod invoice_detail;

pub use invoice::{CreateInvoice, Invoice, ListInvoicesFilter, UpdateInvoice};
pub use invoice_detail::{CreateDetail, DetailInput, InvoiceDetail, UpdateDetail};
