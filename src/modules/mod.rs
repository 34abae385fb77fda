pub mod fiscal;
pub mod gateways;
pub mod health;
pub mod invoices;
pub mod payments;
