use super::ids::ProductId;
use super::money::Money;
use crate::error::CartError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog entry.
///
/// `stock_quantity` is only changed by admin operations and by checkout
/// commit/rollback, always through the catalog store's conditional
/// adjustments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock_quantity: u32,
    /// Untagged products cannot be scanned.
    pub rfid_tag: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        price: Money,
        stock_quantity: u32,
        rfid_tag: Option<String>,
    ) -> Result<Self, CartError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CartError::MissingField("name"));
        }
        let rfid_tag = match rfid_tag {
            Some(tag) if tag.trim().is_empty() => None,
            Some(tag) => Some(tag.trim().to_string()),
            None => None,
        };
        Ok(Self {
            id,
            name,
            price,
            stock_quantity,
            rfid_tag,
            category: None,
            description: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_in_stock(&self) -> bool {
        self.stock_quantity > 0
    }

    /// Checks that `requested` units can still be taken from live stock.
    pub fn ensure_covers(&self, requested: u32) -> Result<(), CartError> {
        if self.stock_quantity < requested {
            Err(CartError::InsufficientStock {
                product: self.name.clone(),
                available: self.stock_quantity,
                requested,
            })
        } else {
            Ok(())
        }
    }
}

/// Outcome of a conditional stock adjustment at the catalog store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockAdjustment {
    /// The write happened; carries the new stock level.
    Applied(u32),
    /// Decrement refused because live stock no longer covers it.
    Insufficient { available: u32 },
    /// The product no longer exists.
    Missing,
}
