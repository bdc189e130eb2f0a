mod invoice;

pub use invoice::{CreateInvoiceRequest, FiscalYear, Invoice, InvoiceDraft, PaymentChannel};
