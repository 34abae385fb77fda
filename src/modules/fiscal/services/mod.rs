pub mod fiscal_client;
pub mod fiscal_gateway;
pub mod fiscal_service;
pub mod fiscal_sweeper;

pub use fiscal_client::FiscalGatewayClient;
pub use fiscal_gateway::{
    CancelledDocument, CreatedDocument, FetchedDocument, FiscalGateway, SentDocument,
    ValidatedDocument,
};
pub use fiscal_service::{DocumentKind, FiscalService};
pub use fiscal_sweeper::FiscalSweeper;
