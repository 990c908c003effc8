use crate::domain::cart::PhysicalCart;
use crate::domain::ids::{CartId, SessionId};
use crate::domain::ports::Stores;
use crate::domain::product::Product;
use crate::error::{CartError, Result};
use crate::locks::KeyedLocks;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// What a cart reader learns about the cart it is mounted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CartAvailability {
    Available,
    InUse { session_id: SessionId },
    /// The cart was held with no active session behind it and has been
    /// put back on the floor.
    Reclaimed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartStatus {
    pub cart_id: CartId,
    pub cart_number: u32,
    pub barcode: String,
    /// True when this lookup registered the cart.
    pub provisioned: bool,
    #[serde(flatten)]
    pub availability: CartAvailability,
}

/// Unauthenticated queries coming from the readers mounted on carts.
pub struct RfidResolver {
    stores: Stores,
    cart_locks: Arc<KeyedLocks<CartId>>,
    /// Serializes auto-provisioning so two unknown carts never get the
    /// same number.
    provisioning: Mutex<()>,
}

impl RfidResolver {
    pub fn new(stores: Stores, cart_locks: Arc<KeyedLocks<CartId>>) -> Self {
        Self {
            stores,
            cart_locks,
            provisioning: Mutex::new(()),
        }
    }

    /// Resolves the cart whose reader reports `cart_uid`, registering an
    /// unknown one and releasing one held without an active session.
    pub async fn resolve_cart(&self, cart_uid: &str) -> Result<CartStatus> {
        let uid = cart_uid.trim();
        if uid.is_empty() {
            return Err(CartError::MissingField("cart_uid"));
        }

        let (cart, provisioned) = match self.stores.carts.find_by_barcode(uid).await? {
            Some(cart) => (cart, false),
            None => self.provision(uid).await?,
        };

        let _cart_guard = self.cart_locks.lock(&cart.id).await;
        // Re-read under the lock; a session may have started or ended since.
        let cart = self
            .stores
            .carts
            .get(&cart.id)
            .await?
            .ok_or_else(|| CartError::internal(format!("cart {} vanished", cart.id)))?;

        let availability = match self.stores.sessions.active_for_cart(&cart.id).await? {
            Some(session) => CartAvailability::InUse {
                session_id: session.id,
            },
            None if cart.is_available => CartAvailability::Available,
            None => {
                self.stores.carts.release(&cart.id).await?;
                warn!(cart_number = cart.cart_number, "Cart held without an active session, released");
                CartAvailability::Reclaimed
            }
        };

        Ok(CartStatus {
            cart_id: cart.id,
            cart_number: cart.cart_number,
            barcode: cart.barcode,
            provisioned,
            availability,
        })
    }

    /// Public product lookup by tag. Out-of-stock products are reported as
    /// such rather than returned.
    pub async fn lookup_product(&self, rfid_tag: &str) -> Result<Product> {
        let tag = rfid_tag.trim();
        if tag.is_empty() {
            return Err(CartError::MissingField("rfid_tag"));
        }
        let product = self
            .stores
            .catalog
            .find_by_rfid(tag)
            .await?
            .ok_or_else(|| CartError::ProductNotFound(tag.to_string()))?;
        if !product.is_in_stock() {
            return Err(CartError::OutOfStock(product.name));
        }
        Ok(product)
    }

    /// Every registered cart, by number.
    pub async fn list_carts(&self) -> Result<Vec<PhysicalCart>> {
        self.stores.carts.all().await
    }

    async fn provision(&self, barcode: &str) -> Result<(PhysicalCart, bool)> {
        let _guard = self.provisioning.lock().await;
        if let Some(cart) = self.stores.carts.find_by_barcode(barcode).await? {
            return Ok((cart, false));
        }

        let next_number = self
            .stores
            .carts
            .all()
            .await?
            .iter()
            .map(|cart| cart.cart_number)
            .max()
            .unwrap_or(0)
            + 1;
        let cart = PhysicalCart::new(next_number, barcode);
        match self.stores.carts.insert(cart.clone()).await {
            Ok(()) => {
                info!(cart_number = next_number, barcode, "Registered new cart");
                Ok((cart, true))
            }
            // Registered through another path in the meantime.
            Err(CartError::DuplicateBarcode(_)) => self
                .stores
                .carts
                .find_by_barcode(barcode)
                .await?
                .map(|cart| (cart, false))
                .ok_or_else(|| CartError::CartUnavailable(barcode.to_string())),
            Err(e) => Err(e),
        }
    }
}
