// Fiscal document embedded in an invoice.
//
// The document moves strictly forward:
//   created -> validated -> sent -> {accepted | rejected | cancelled}
// Absent is represented by `Option::None` on the invoice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AppError, Result};

/// Fiscal document lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FiscalStatus {
    /// Registered with the tax authority, not yet validated
    Created,
    /// Validated, CUFE assigned
    Validated,
    /// Delivered to the tax authority for acceptance
    Sent,
    /// Accepted by the tax authority
    Accepted,
    /// Rejected by the tax authority
    Rejected,
    /// Cancelled after being sent
    Cancelled,
}

impl FiscalStatus {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: FiscalStatus) -> bool {
        matches!(
            (self, next),
            (FiscalStatus::Created, FiscalStatus::Validated)
                | (FiscalStatus::Validated, FiscalStatus::Sent)
                | (FiscalStatus::Sent, FiscalStatus::Accepted)
                | (FiscalStatus::Sent, FiscalStatus::Rejected)
                | (FiscalStatus::Sent, FiscalStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FiscalStatus::Accepted | FiscalStatus::Rejected | FiscalStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FiscalStatus::Created => "created",
            FiscalStatus::Validated => "validated",
            FiscalStatus::Sent => "sent",
            FiscalStatus::Accepted => "accepted",
            FiscalStatus::Rejected => "rejected",
            FiscalStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FiscalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FiscalStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => Ok(FiscalStatus::Created),
            "validated" => Ok(FiscalStatus::Validated),
            "sent" => Ok(FiscalStatus::Sent),
            "accepted" => Ok(FiscalStatus::Accepted),
            "rejected" => Ok(FiscalStatus::Rejected),
            "cancelled" => Ok(FiscalStatus::Cancelled),
            _ => Err(format!("Invalid fiscal status: {}", s)),
        }
    }
}

/// One recorded transition together with the raw adapter response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalEvent {
    pub status: FiscalStatus,
    pub at: DateTime<Utc>,
    pub raw: Value,
}

/// Electronic record of an invoice as recognized by the tax authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalDocument {
    /// Identifier assigned by the fiscal gateway
    pub external_id: String,

    /// Unique fiscal code, assigned on validation
    pub cufe: Option<String>,

    pub status: FiscalStatus,
    pub created_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_reason: Option<String>,

    /// Responses were simulated by a non-production adapter
    pub sandbox: bool,
    pub warning: Option<String>,

    /// Raw adapter responses, oldest first
    #[serde(default)]
    pub history: Vec<FiscalEvent>,
}

impl FiscalDocument {
    /// Build a freshly created document from the adapter's answer
    pub fn created(
        external_id: String,
        sandbox: bool,
        warning: Option<String>,
        raw: Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id,
            cufe: None,
            status: FiscalStatus::Created,
            created_at: at,
            validated_at: None,
            sent_at: None,
            accepted_at: None,
            rejected_reason: None,
            cancelled_at: None,
            cancelled_reason: None,
            sandbox,
            warning,
            history: vec![FiscalEvent {
                status: FiscalStatus::Created,
                at,
                raw,
            }],
        }
    }

    /// Apply a forward transition, stamping the matching timestamp
    ///
    /// # Errors
    /// * `StateConflict` - `next` is not a legal successor of the current status
    pub fn transition(&mut self, next: FiscalStatus, at: DateTime<Utc>, raw: Value) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::conflict(format!(
                "Fiscal document {} cannot move from '{}' to '{}'",
                self.external_id, self.status, next
            )));
        }

        match next {
            FiscalStatus::Validated => self.validated_at = Some(at),
            FiscalStatus::Sent => self.sent_at = Some(at),
            FiscalStatus::Accepted => self.accepted_at = Some(at),
            FiscalStatus::Cancelled => self.cancelled_at = Some(at),
            FiscalStatus::Rejected | FiscalStatus::Created => {}
        }

        self.status = next;
        self.history.push(FiscalEvent {
            status: next,
            at,
            raw,
        });

        Ok(())
    }

    /// Label shown next to the invoice in user screens
    pub fn badge(document: Option<&FiscalDocument>) -> &'static str {
        match document.map(|d| d.status) {
            None | Some(FiscalStatus::Created) => "not yet sent",
            Some(FiscalStatus::Validated) => "validated",
            Some(FiscalStatus::Sent) => "sent",
            Some(FiscalStatus::Accepted) => "accepted",
            Some(FiscalStatus::Rejected) => "rejected",
            Some(FiscalStatus::Cancelled) => "cancelled",
        }
    }
}
