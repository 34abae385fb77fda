pub mod payment_mode_repository;
pub mod payment_repository;

pub use payment_mode_repository::{MySqlPaymentModeRepository, PaymentModeRepository};
pub use payment_repository::{MySqlPaymentRepository, PaymentRepository};
