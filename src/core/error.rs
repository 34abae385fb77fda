use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Validation errors for business rules
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing credentials or disabled integration. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout, connection failure or 5xx from a counterparty or the data store.
    /// Retried only by the next opportunistic trigger.
    #[error("Transient gateway error: {0}")]
    TransientGateway(String),

    /// Illegal state transition requested by the caller
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Webhook signature did not match. The message is never rendered.
    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A payment with the same (gateway, transaction id) already exists
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = match self {
            // Do not leak which part of the signature mismatched
            AppError::SignatureInvalid(_) => "Invalid webhook signature".to_string(),
            _ => self.to_string(),
        };

        HttpResponse::build(status_code).json(serde_json::json!({
            "error": {
                "message": error_message,
                "code": status_code.as_u16(),
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::TransientGateway(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::StateConflict(_) => StatusCode::CONFLICT,
            AppError::SignatureInvalid(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateTransaction(_) => StatusCode::OK,
            AppError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        AppError::TransientGateway(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        AppError::StateConflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// True when a later attempt may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientGateway(_) | AppError::Database(_))
    }

    /// Short, stable label used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Configuration(_) => "configuration",
            AppError::TransientGateway(_) => "transient_gateway",
            AppError::StateConflict(_) => "state_conflict",
            AppError::SignatureInvalid(_) => "signature_invalid",
            AppError::NotFound(_) => "not_found",
            AppError::DuplicateTransaction(_) => "duplicate_transaction",
            AppError::Database(_) => "database",
            AppError::Json(_) => "json",
            AppError::Internal(_) => "internal",
        }
    }

    /// Classify a reqwest failure for the named counterparty
    pub fn from_http(gateway: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return AppError::TransientGateway(format!(
                "{} unavailable: {} ({})",
                gateway,
                if err.is_timeout() {
                    "timeout"
                } else {
                    "connection failed"
                },
                err
            ));
        }

        match err.status() {
            Some(status) if status.is_server_error() => {
                AppError::TransientGateway(format!("{} returned HTTP {}", gateway, status))
            }
            _ => AppError::Internal(format!("{} request failed: {}", gateway, err)),
        }
    }

    /// Classify a non-success HTTP status returned by a counterparty
    pub fn from_status(gateway: &str, status: reqwest::StatusCode, body: &str) -> Self {
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            AppError::TransientGateway(format!(
                "{} API error - HTTP {} ({})",
                gateway,
                status.as_u16(),
                body
            ))
        } else if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            AppError::Configuration(format!(
                "{} rejected credentials - HTTP {}",
                gateway,
                status.as_u16()
            ))
        } else {
            AppError::Internal(format!(
                "{} API error - HTTP {} ({})",
                gateway,
                status.as_u16(),
                body
            ))
        }
    }
}
