mod invoice;
mod line_item;

pub use invoice::{CreateInvoiceRequest, Invoice, InvoiceResponse, PaymentStatus};
pub use line_item::{CreateLineItemRequest, LineItem};
