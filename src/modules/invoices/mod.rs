// Invoices module

pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{FiscalYear, Invoice, PaymentChannel};
pub use repositories::{InMemoryInvoiceRepository, InvoiceRepository, MySqlInvoiceRepository};
pub use services::{generate_invoice_sequence, InvoiceService};
