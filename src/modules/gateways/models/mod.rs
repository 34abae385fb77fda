mod gateway_session;

pub use gateway_session::{
    CheckoutRedirect, GatewayEnvironment, GatewaySession, RedirectMethod, SessionHandle,
    SessionStatus,
};
