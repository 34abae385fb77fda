use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::fiscal_gateway::{
    CancelledDocument, CreatedDocument, FetchedDocument, FiscalGateway, SentDocument,
    ValidatedDocument,
};
use crate::config::FiscalConfig;
use crate::core::{AppError, Result};
use crate::modules::fiscal::models::FiscalStatus;
use crate::modules::invoices::models::Invoice;

const GATEWAY: &str = "fiscal gateway";

pub const SANDBOX_WARNING: &str =
    "Fiscal gateway in sandbox mode: document is simulated and has no legal validity";

// Refresh the token this long before it expires
const TOKEN_SKEW: Duration = Duration::from_secs(60);

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

struct Credentials<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    username: &'a str,
    password: &'a str,
}

/// HTTP client for the tax-authority gateway
///
/// In sandbox mode no request leaves the process; every call returns a
/// structurally valid response tagged `sandbox = true`.
pub struct FiscalGatewayClient {
    client: Client,
    config: FiscalConfig,
    token: Mutex<Option<CachedToken>>,
}

impl FiscalGatewayClient {
    pub fn new(config: FiscalConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    fn credentials(&self) -> Result<Credentials<'_>> {
        match (
            self.config.client_id.as_deref(),
            self.config.client_secret.as_deref(),
            self.config.username.as_deref(),
            self.config.password.as_deref(),
        ) {
            (Some(client_id), Some(client_secret), Some(username), Some(password)) => {
                Ok(Credentials {
                    client_id,
                    client_secret,
                    username,
                    password,
                })
            }
            _ => Err(AppError::configuration(
                "Fiscal gateway credentials are not configured",
            )),
        }
    }

    /// Bearer token from the password-grant exchange, cached until near expiry
    async fn access_token(&self) -> Result<String> {
        let credentials = self.credentials()?;
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_SKEW {
                return Ok(token.access_token.clone());
            }
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            #[serde(default = "default_expires_in")]
            expires_in: u64,
        }

        let url = format!("{}/oauth/token", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "password"),
                ("client_id", credentials.client_id),
                ("client_secret", credentials.client_secret),
                ("username", credentials.username),
                ("password", credentials.password),
            ])
            .send()
            .await
            .map_err(|e| AppError::from_http(GATEWAY, e))?;

        let response = ensure_success(response).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::from_http(GATEWAY, e))?;

        debug!(expires_in = token.expires_in, "Fiscal gateway token refreshed");

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });

        Ok(access_token)
    }

    /// Drop the cached token if it is still the one the gateway rejected
    async fn invalidate_token(&self, rejected: &str) {
        let mut cached = self.token.lock().await;
        if cached
            .as_ref()
            .is_some_and(|token| token.access_token == rejected)
        {
            *cached = None;
        }
    }

    /// Send an authenticated request
    ///
    /// A 401 drops the cached token and retries once with a fresh exchange;
    /// only a second rejection is reported as a configuration error.
    async fn send_authorized(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut retried = false;

        loop {
            let token = self.access_token().await?;

            let mut builder = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .header("Accept", "application/json");
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| AppError::from_http(GATEWAY, e))?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                warn!(path = %path, "Fiscal gateway rejected the cached token, exchanging again");
                self.invalidate_token(&token).await;
                retried = true;
                continue;
            }

            return ensure_success(response).await;
        }
    }

    async fn send_json(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        self.send_authorized(method, path, body)
            .await?
            .json()
            .await
            .map_err(|e| AppError::from_http(GATEWAY, e))
    }

    async fn download(&self, external_id: &str, kind: &str) -> Result<Vec<u8>> {
        let response = self
            .send_authorized(
                Method::GET,
                &format!("/v1/documents/{}/{}", external_id, kind),
                None,
            )
            .await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::from_http(GATEWAY, e))?;

        Ok(bytes.to_vec())
    }

    fn document_body(&self, invoice: &Invoice) -> Value {
        let items: Vec<Value> = invoice
            .items
            .iter()
            .map(|item| {
                json!({
                    "name": item.item_name,
                    "description": item.description,
                    "quantity": item.quantity,
                    "price": item.price,
                    "total": item.total,
                    "tax_rate": invoice.tax_rate,
                })
            })
            .collect();

        json!({
            "reference_code": invoice.id,
            "number": format!("{}-{}", invoice.year, invoice.number),
            "numbering_range_id": self.config.numbering_range_id,
            "customer": { "identification": invoice.client_id },
            "currency": invoice.currency,
            "items": items,
            "sub_total": invoice.sub_total,
            "tax_total": invoice.tax_total,
            "discount": invoice.discount,
            "total": invoice.total,
            "notes": invoice.notes,
        })
    }

    // Sandbox responses

    fn sandbox_cufe(external_id: &str) -> String {
        hex::encode(Sha256::digest(external_id.as_bytes()))
    }

    fn sandbox_raw(operation: &str, external_id: &str, status: FiscalStatus) -> Value {
        json!({
            "sandbox": true,
            "operation": operation,
            "id": external_id,
            "status": status,
            "warning": SANDBOX_WARNING,
        })
    }
}

fn default_expires_in() -> u64 {
    3600
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::from_status(GATEWAY, status, &body))
}

/// Documents are returned either bare or wrapped in `data`
fn payload(value: &Value) -> &Value {
    value.get("data").unwrap_or(value)
}

fn remote_status(value: &Value) -> Result<FiscalStatus> {
    let status = payload(value)
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::internal("Fiscal gateway response has no status"))?;

    match status.to_ascii_lowercase().as_str() {
        "created" | "draft" | "pending" => Ok(FiscalStatus::Created),
        "validated" | "valid" => Ok(FiscalStatus::Validated),
        "sent" | "submitted" => Ok(FiscalStatus::Sent),
        "accepted" | "approved" => Ok(FiscalStatus::Accepted),
        "rejected" | "refused" => Ok(FiscalStatus::Rejected),
        "cancelled" | "canceled" | "voided" => Ok(FiscalStatus::Cancelled),
        other => Err(AppError::internal(format!(
            "Fiscal gateway returned unknown status '{}'",
            other
        ))),
    }
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    payload(value)
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl FiscalGateway for FiscalGatewayClient {
    fn is_sandbox(&self) -> bool {
        !self.config.environment.is_production()
    }

    async fn create_document(&self, invoice: &Invoice) -> Result<CreatedDocument> {
        if self.is_sandbox() {
            let external_id = format!("SANDBOX-{}", Uuid::new_v4());
            info!(invoice_id = %invoice.id, external_id = %external_id, "Simulated fiscal document");
            return Ok(CreatedDocument {
                raw: Self::sandbox_raw("create", &external_id, FiscalStatus::Created),
                external_id,
                status: FiscalStatus::Created,
                sandbox: true,
                warning: Some(SANDBOX_WARNING.to_string()),
            });
        }

        let body = self.document_body(invoice);
        let raw = self
            .send_json(Method::POST, "/v1/documents", Some(&body))
            .await?;

        let external_id = string_field(&raw, "id")
            .ok_or_else(|| AppError::internal("Fiscal gateway response has no document id"))?;

        Ok(CreatedDocument {
            external_id,
            status: remote_status(&raw)?,
            sandbox: false,
            warning: string_field(&raw, "warning"),
            raw,
        })
    }

    async fn validate_document(&self, external_id: &str) -> Result<ValidatedDocument> {
        if self.is_sandbox() {
            return Ok(ValidatedDocument {
                status: FiscalStatus::Validated,
                cufe: Some(Self::sandbox_cufe(external_id)),
                raw: Self::sandbox_raw("validate", external_id, FiscalStatus::Validated),
            });
        }

        let raw = self
            .send_json(
                Method::POST,
                &format!("/v1/documents/{}/validate", external_id),
                None,
            )
            .await?;

        Ok(ValidatedDocument {
            status: remote_status(&raw)?,
            cufe: string_field(&raw, "cufe"),
            raw,
        })
    }

    async fn send_document(&self, external_id: &str) -> Result<SentDocument> {
        if self.is_sandbox() {
            return Ok(SentDocument {
                status: FiscalStatus::Sent,
                raw: Self::sandbox_raw("send", external_id, FiscalStatus::Sent),
            });
        }

        let raw = self
            .send_json(Method::POST, &format!("/v1/documents/{}/send", external_id), None)
            .await?;

        Ok(SentDocument {
            status: remote_status(&raw)?,
            raw,
        })
    }

    async fn fetch_document(&self, external_id: &str, with_files: bool) -> Result<FetchedDocument> {
        if self.is_sandbox() {
            let (pdf, xml) = if with_files {
                (
                    Some(format!("%PDF-1.4\n% sandbox {}\n%%EOF\n", external_id).into_bytes()),
                    Some(
                        format!(
                            "<?xml version=\"1.0\"?><Invoice sandbox=\"true\"><ID>{}</ID><UUID>{}</UUID></Invoice>",
                            external_id,
                            Self::sandbox_cufe(external_id)
                        )
                        .into_bytes(),
                    ),
                )
            } else {
                (None, None)
            };

            return Ok(FetchedDocument {
                status: FiscalStatus::Accepted,
                rejected_reason: None,
                pdf,
                xml,
                raw: Self::sandbox_raw("fetch", external_id, FiscalStatus::Accepted),
            });
        }

        let raw = self
            .send_json(Method::GET, &format!("/v1/documents/{}", external_id), None)
            .await?;
        let status = remote_status(&raw)?;

        let (pdf, xml) = if with_files {
            (
                Some(self.download(external_id, "pdf").await?),
                Some(self.download(external_id, "xml").await?),
            )
        } else {
            (None, None)
        };

        Ok(FetchedDocument {
            status,
            rejected_reason: string_field(&raw, "rejected_reason")
                .or_else(|| string_field(&raw, "message")),
            pdf,
            xml,
            raw,
        })
    }

    async fn cancel_document(&self, external_id: &str, reason: &str) -> Result<CancelledDocument> {
        if self.is_sandbox() {
            let mut raw = Self::sandbox_raw("cancel", external_id, FiscalStatus::Cancelled);
            raw["reason"] = Value::String(reason.to_string());
            return Ok(CancelledDocument {
                status: FiscalStatus::Cancelled,
                raw,
            });
        }

        let body = json!({ "reason": reason });
        let raw = self
            .send_json(
                Method::POST,
                &format!("/v1/documents/{}/cancel", external_id),
                Some(&body),
            )
            .await?;

        Ok(CancelledDocument {
            status: remote_status(&raw)?,
            raw,
        })
    }
}
