//! Fiscal document lifecycle and payment reconciliation service
//!
//! Invoices drive an external tax-authority document through
//! create → validate → send → accept/reject → cancel, and payment gateway
//! webhooks are reconciled against the invoice balance exactly once.

pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;
pub mod startup;
pub mod storage;

// Re-export commonly used types
pub use modules::fiscal;
pub use modules::gateways;
pub use modules::invoices;
pub use modules::payments;
