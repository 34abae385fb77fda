mod fiscal_document;

pub use fiscal_document::{FiscalDocument, FiscalEvent, FiscalStatus};
