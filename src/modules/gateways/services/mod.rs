pub mod checkout;
pub mod epayco;
pub mod gateway_service;
pub mod gateway_trait;

pub use checkout::CheckoutClient;
pub use epayco::EpaycoClient;
pub use gateway_service::{GatewayInfo, GatewayService};
pub use gateway_trait::{
    GatewayStatus, Payer, PaymentGateway, PaymentOutcome, VerifiedEvent, WebhookHeaders,
};
