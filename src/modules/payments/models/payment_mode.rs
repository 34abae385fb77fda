use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a payment was made; one mode per gateway name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMode {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentMode {
    pub fn for_gateway(name: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: Some(format!("Payments received through {}", name)),
            created_at: Utc::now(),
        }
    }
}
