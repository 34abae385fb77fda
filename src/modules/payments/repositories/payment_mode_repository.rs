use async_trait::async_trait;
use sqlx::{MySqlPool, Row};

use crate::core::{AppError, Result};
use crate::modules::payments::models::PaymentMode;

#[async_trait]
pub trait PaymentModeRepository: Send + Sync {
    /// Find the payment mode named `name`, creating it if absent
    async fn find_or_create(&self, name: &str) -> Result<PaymentMode>;
}

pub struct MySqlPaymentModeRepository {
    pool: MySqlPool,
}

impl MySqlPaymentModeRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<PaymentMode>> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at FROM payment_modes WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch payment mode: {}", e)))?;

        match row {
            Some(row) => Ok(Some(PaymentMode {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                created_at: row.try_get("created_at")?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentModeRepository for MySqlPaymentModeRepository {
    async fn find_or_create(&self, name: &str) -> Result<PaymentMode> {
        if let Some(mode) = self.find_by_name(name).await? {
            return Ok(mode);
        }

        let mode = PaymentMode::for_gateway(name);

        // A concurrent creator wins on the unique name; reread below
        sqlx::query(
            "INSERT IGNORE INTO payment_modes (id, name, description, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&mode.id)
        .bind(&mode.name)
        .bind(&mode.description)
        .bind(mode.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create payment mode: {}", e)))?;

        self.find_by_name(name)
            .await?
            .ok_or_else(|| AppError::internal(format!("Payment mode {} vanished", name)))
    }
}
