use super::ids::{CartId, ProductId, SessionId, ShopperId};
use super::money::Money;
use super::product::Product;
use crate::error::CartError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a session stopped being active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Shopper,
    Checkout,
    /// The shopper started a new session.
    Superseded,
    SystemShutdown,
    ManualCleanup,
}

/// One product in the cart, priced at the moment it was first scanned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
    pub total_price: Money,
    pub rfid_tag: String,
    pub scanned_at: DateTime<Utc>,
}

impl LineItem {
    fn first_unit(product: &Product, rfid_tag: &str, at: DateTime<Utc>) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            price: product.price,
            quantity: 1,
            total_price: product.price,
            rfid_tag: rfid_tag.to_string(),
            scanned_at: at,
        }
    }

    fn set_quantity(&mut self, quantity: u32) {
        self.quantity = quantity;
        self.total_price = self.price * quantity;
    }
}

/// What a presence toggle did to the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
}

/// A shopper's in-progress cart.
///
/// Items are only mutated through the methods below, each of which ends with
/// [`Session::recalculate_total`], so `total_amount` always equals the sum of
/// the line totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub shopper: ShopperId,
    pub cart_id: CartId,
    pub items: Vec<LineItem>,
    pub total_amount: Money,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub ended_by: Option<EndReason>,
}

impl Session {
    pub fn new(shopper: ShopperId, cart_id: CartId, at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::generate(),
            shopper,
            cart_id,
            items: Vec::new(),
            total_amount: Money::ZERO,
            is_active: true,
            started_at: at,
            updated_at: at,
            ended_at: None,
            ended_by: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, product_id: &ProductId) -> Option<&LineItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    /// Adds one unit of `product`, appending a new line if needed.
    pub fn scan(&mut self, product: &Product, at: DateTime<Utc>) -> Result<(), CartError> {
        let rfid_tag = scannable_tag(product)?;
        if !product.is_in_stock() {
            return Err(CartError::OutOfStock(product.name.clone()));
        }

        match self
            .items
            .iter_mut()
            .find(|item| item.product_id == product.id)
        {
            Some(item) => {
                let wanted = item.quantity + 1;
                product.ensure_covers(wanted)?;
                item.set_quantity(wanted);
            }
            None => self.items.push(LineItem::first_unit(product, rfid_tag, at)),
        }

        self.touch(at);
        Ok(())
    }

    /// Removes the whole line carrying the product's tag, or adds one unit
    /// when no line carries it.
    pub fn toggle(
        &mut self,
        product: &Product,
        at: DateTime<Utc>,
    ) -> Result<ToggleOutcome, CartError> {
        let rfid_tag = scannable_tag(product)?;
        if let Some(index) = self.items.iter().position(|item| item.rfid_tag == rfid_tag) {
            self.items.remove(index);
            self.touch(at);
            return Ok(ToggleOutcome::Removed);
        }

        if !product.is_in_stock() {
            return Err(CartError::OutOfStock(product.name.clone()));
        }
        self.items.push(LineItem::first_unit(product, rfid_tag, at));
        self.touch(at);
        Ok(ToggleOutcome::Added)
    }

    /// Takes one unit off the product's line, dropping the line at zero.
    pub fn remove_one(&mut self, product_id: &ProductId, at: DateTime<Utc>) -> Result<(), CartError> {
        let index = self
            .items
            .iter()
            .position(|item| &item.product_id == product_id)
            .ok_or_else(|| CartError::ItemNotFound(product_id.to_string()))?;

        let remaining = self.items[index].quantity.saturating_sub(1);
        if remaining == 0 {
            self.items.remove(index);
        } else {
            self.items[index].set_quantity(remaining);
        }

        self.touch(at);
        Ok(())
    }

    /// Marks the session inactive. Only the store's conditional close
    /// should call this on a persisted session.
    pub fn close(&mut self, reason: EndReason, at: DateTime<Utc>) {
        self.is_active = false;
        self.ended_at = Some(at);
        self.ended_by = Some(reason);
        self.updated_at = at;
    }

    pub fn recalculate_total(&mut self) {
        self.total_amount = self.items.iter().map(|item| item.total_price).sum();
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.recalculate_total();
        self.updated_at = at;
    }
}

fn scannable_tag(product: &Product) -> Result<&str, CartError> {
    product
        .rfid_tag
        .as_deref()
        .ok_or_else(|| CartError::ProductNotFound(format!("{} has no RFID tag", product.name)))
}

/// Read-only cart view. Shoppers without an active session get an empty one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session_id: Option<SessionId>,
    pub cart_number: Option<u32>,
    pub items: Vec<LineItem>,
    pub total_amount: Money,
}

impl SessionView {
    pub fn empty() -> Self {
        Self {
            session_id: None,
            cart_number: None,
            items: Vec::new(),
            total_amount: Money::ZERO,
        }
    }

    pub fn of(session: &Session, cart_number: Option<u32>) -> Self {
        Self {
            session_id: Some(session.id.clone()),
            cart_number,
            items: session.items.clone(),
            total_amount: session.total_amount,
        }
    }
}
