// A single product or service line on an invoice.
// The line total is quantity × price rounded to the invoice currency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Currency, Result};

/// Represents a single line item in an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Name of the product or service
    pub item_name: String,

    pub description: Option<String>,

    /// Quantity, may be fractional (hours, kilos)
    pub quantity: Decimal,

    /// Price per unit
    pub price: Decimal,

    /// quantity × price, rounded per currency
    pub total: Decimal,
}

/// Line item as submitted by API clients
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLineItemRequest {
    pub item_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl LineItem {
    /// Create a new line item with validation
    ///
    /// # Arguments
    /// * `request` - Submitted line (name max 255 chars, positive quantity, non-negative price)
    /// * `currency` - Invoice currency used for rounding
    pub fn new(request: CreateLineItemRequest, currency: Currency) -> Result<Self> {
        Self::validate_item_name(&request.item_name)?;
        Self::validate_quantity(request.quantity)?;
        Self::validate_price(request.price, currency)?;

        let total = currency.round(request.quantity * request.price);

        Ok(Self {
            item_name: request.item_name.trim().to_string(),
            description: request.description,
            quantity: request.quantity,
            price: request.price,
            total,
        })
    }

    fn validate_item_name(item_name: &str) -> Result<()> {
        if item_name.trim().is_empty() {
            return Err(AppError::validation("Line item name cannot be empty"));
        }

        if item_name.len() > 255 {
            return Err(AppError::validation(
                "Line item name cannot exceed 255 characters",
            ));
        }

        Ok(())
    }

    fn validate_quantity(quantity: Decimal) -> Result<()> {
        if quantity <= Decimal::ZERO {
            return Err(AppError::validation("Line item quantity must be positive"));
        }

        Ok(())
    }

    fn validate_price(price: Decimal, currency: Currency) -> Result<()> {
        currency
            .validate_amount(price)
            .map_err(|e| AppError::validation(format!("Line item price: {}", e)))
    }
}
