mod payment;
mod payment_mode;

pub use payment::{NewPayment, Payment};
pub use payment_mode::PaymentMode;
