pub mod fiscal_controller;

pub use fiscal_controller::configure;
