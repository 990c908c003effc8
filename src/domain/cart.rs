use super::ids::CartId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A physical cart on the shop floor.
///
/// `is_available` is false exactly while one active session holds the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalCart {
    pub id: CartId,
    pub cart_number: u32,
    pub barcode: String,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

impl PhysicalCart {
    pub fn new(cart_number: u32, barcode: impl Into<String>) -> Self {
        Self {
            id: CartId::generate(),
            cart_number,
            barcode: barcode.into(),
            is_available: true,
            created_at: Utc::now(),
        }
    }

    /// Barcode printed on the n-th provisioned cart: `CART001`, `CART002`, ...
    pub fn provisioned_barcode(cart_number: u32) -> String {
        format!("CART{cart_number:03}")
    }
}
