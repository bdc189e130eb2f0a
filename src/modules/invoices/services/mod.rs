pub mod invoice_numbering;
pub mod invoice_service;

pub use invoice_numbering::generate_invoice_sequence;
pub use invoice_service::{InvoiceService, IssuedInvoice};
