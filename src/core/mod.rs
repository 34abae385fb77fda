pub mod currency;
pub mod error;
pub mod signature;

pub use currency::Currency;
pub use error::{AppError, Result};
