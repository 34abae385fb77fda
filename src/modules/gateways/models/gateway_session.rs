use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Environment a gateway adapter talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayEnvironment {
    Sandbox,
    Production,
}

impl GatewayEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, GatewayEnvironment::Production)
    }
}

impl std::fmt::Display for GatewayEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayEnvironment::Sandbox => write!(f, "sandbox"),
            GatewayEnvironment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for GatewayEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sandbox" | "test" | "development" => Ok(GatewayEnvironment::Sandbox),
            "production" | "live" => Ok(GatewayEnvironment::Production),
            _ => Err(format!("Invalid gateway environment: {}", s)),
        }
    }
}

/// Gateway session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Pending)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RedirectMethod {
    Get,
    Post,
}

/// What the payer's browser must do to resume the payment UI
///
/// Only public, per-session values are stored here; shared secrets never are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRedirect {
    pub method: RedirectMethod,
    pub url: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl CheckoutRedirect {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: RedirectMethod::Get,
            url: url.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Auto-submitting HTML form carrying the stored fields
    pub fn render_form(&self) -> String {
        let method = match self.method {
            RedirectMethod::Get => "get",
            RedirectMethod::Post => "post",
        };

        let inputs: String = self
            .fields
            .iter()
            .map(|(name, value)| {
                format!(
                    "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>",
                    escape_html(name),
                    escape_html(value)
                )
            })
            .collect::<Vec<_>>()
            .join("");

        format!(
            "<!DOCTYPE html><html><body onload=\"document.forms[0].submit()\">\
             <form method=\"{}\" action=\"{}\">{}<noscript><button type=\"submit\">Continue</button></noscript></form>\
             </body></html>",
            method,
            escape_html(&self.url),
            inputs
        )
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Adapter answer to a session creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHandle {
    /// Gateway-side session id or our own reference for form-based gateways
    pub reference: String,
    pub checkout: CheckoutRedirect,
    pub sandbox: bool,
}

/// Per-(invoice, gateway) record tracking one payment attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewaySession {
    pub reference: String,
    pub status: SessionStatus,
    pub transaction_id: Option<String>,
    pub checkout: CheckoutRedirect,
    pub sandbox: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl GatewaySession {
    pub fn pending(handle: SessionHandle, at: DateTime<Utc>) -> Self {
        Self {
            reference: handle.reference,
            status: SessionStatus::Pending,
            transaction_id: None,
            checkout: handle.checkout,
            sandbox: handle.sandbox,
            created_at: at,
            completed_at: None,
            failed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Move a pending session to a terminal status
    ///
    /// Returns false (and leaves the session untouched) if it is already
    /// terminal or `reference` names a different session.
    pub fn settle(
        &mut self,
        reference: &str,
        status: SessionStatus,
        transaction_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> bool {
        if self.reference != reference
            || self.status.is_terminal()
            || status == SessionStatus::Pending
        {
            return false;
        }

        self.status = status;
        if let Some(transaction_id) = transaction_id {
            self.transaction_id = Some(transaction_id.to_string());
        }
        match status {
            SessionStatus::Completed => self.completed_at = Some(at),
            _ => self.failed_at = Some(at),
        }
        true
    }
}
