pub mod controllers;
pub mod models;
pub mod services;

pub use controllers::configure;
pub use models::{GatewayEnvironment, GatewaySession, SessionStatus};
pub use services::{
    CheckoutClient, EpaycoClient, GatewayInfo, GatewayService, PaymentGateway, PaymentOutcome,
    VerifiedEvent,
};
