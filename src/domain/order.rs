use super::checkout::{MaskedCard, PaymentMethod};
use super::ids::{OrderId, ShopperId};
use super::money::Money;
use super::session::LineItem;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Completed,
}

/// A completed purchase. Append-only once written to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub shopper: ShopperId,
    pub items: Vec<LineItem>,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
    pub card: Option<MaskedCard>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    /// Display number, not a key: `ORD-<yyyymmddHHMMSS>-<4 digits>`.
    pub order_number: String,
}

impl Order {
    pub fn completed(
        shopper: ShopperId,
        items: Vec<LineItem>,
        total_amount: Money,
        payment_method: PaymentMethod,
        card: Option<MaskedCard>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::generate(),
            shopper,
            items,
            total_amount,
            payment_method,
            card,
            status: OrderStatus::Completed,
            created_at: at,
            order_number: order_number(at),
        }
    }
}

pub fn order_number(at: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    format!("ORD-{}-{}", at.format("%Y%m%d%H%M%S"), suffix)
}
