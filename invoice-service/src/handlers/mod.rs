//! HTTP handlers for invoice-service.

pub mod details;
pub mod invoices;
