pub mod controllers;
pub mod models;
pub mod services;

pub use controllers::configure;
pub use models::{FiscalDocument, FiscalEvent, FiscalStatus};
pub use services::{FiscalGateway, FiscalGatewayClient, FiscalService, FiscalSweeper};
