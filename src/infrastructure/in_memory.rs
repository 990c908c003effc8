use crate::domain::cart::PhysicalCart;
use crate::domain::checkout::CheckoutTicket;
use crate::domain::ids::{CartId, ProductId, SessionId, ShopperId};
use crate::domain::order::Order;
use crate::domain::ports::{CartRegistry, CatalogStore, OrderLedger, SessionStore, Stores, TicketStore};
use crate::domain::product::{Product, StockAdjustment};
use crate::domain::session::{EndReason, Session};
use crate::error::{CartError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory product catalog.
///
/// Conditional stock adjustments run under the write lock, which makes them
/// linearizable across every session.
#[derive(Default, Clone)]
pub struct InMemoryCatalogStore {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn insert(&self, product: Product) -> Result<()> {
        let mut products = self.products.write().await;
        if let Some(tag) = &product.rfid_tag
            && products
                .values()
                .any(|p| p.id != product.id && p.rfid_tag.as_ref() == Some(tag))
        {
            return Err(CartError::DuplicateRfidTag(tag.clone()));
        }
        products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn get(&self, id: &ProductId) -> Result<Option<Product>> {
        let products = self.products.read().await;
        Ok(products.get(id).cloned())
    }

    async fn find_by_rfid(&self, rfid_tag: &str) -> Result<Option<Product>> {
        let products = self.products.read().await;
        Ok(products
            .values()
            .find(|p| p.rfid_tag.as_deref() == Some(rfid_tag))
            .cloned())
    }

    async fn all(&self) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        let mut all: Vec<Product> = products.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn decrement_stock(&self, id: &ProductId, quantity: u32) -> Result<StockAdjustment> {
        let mut products = self.products.write().await;
        Ok(match products.get_mut(id) {
            None => StockAdjustment::Missing,
            Some(product) if product.stock_quantity < quantity => StockAdjustment::Insufficient {
                available: product.stock_quantity,
            },
            Some(product) => {
                product.stock_quantity -= quantity;
                StockAdjustment::Applied(product.stock_quantity)
            }
        })
    }

    async fn increment_stock(&self, id: &ProductId, quantity: u32) -> Result<StockAdjustment> {
        let mut products = self.products.write().await;
        Ok(match products.get_mut(id) {
            None => StockAdjustment::Missing,
            Some(product) => {
                product.stock_quantity = product.stock_quantity.saturating_add(quantity);
                StockAdjustment::Applied(product.stock_quantity)
            }
        })
    }
}

/// A thread-safe in-memory registry of physical carts.
#[derive(Default, Clone)]
pub struct InMemoryCartRegistry {
    carts: Arc<RwLock<HashMap<CartId, PhysicalCart>>>,
}

impl InMemoryCartRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartRegistry for InMemoryCartRegistry {
    async fn insert(&self, cart: PhysicalCart) -> Result<()> {
        let mut carts = self.carts.write().await;
        if carts
            .values()
            .any(|c| c.id != cart.id && c.barcode == cart.barcode)
        {
            return Err(CartError::DuplicateBarcode(cart.barcode));
        }
        carts.insert(cart.id.clone(), cart);
        Ok(())
    }

    async fn get(&self, id: &CartId) -> Result<Option<PhysicalCart>> {
        let carts = self.carts.read().await;
        Ok(carts.get(id).cloned())
    }

    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<PhysicalCart>> {
        let carts = self.carts.read().await;
        Ok(carts.values().find(|c| c.barcode == barcode).cloned())
    }

    async fn all(&self) -> Result<Vec<PhysicalCart>> {
        let carts = self.carts.read().await;
        let mut all: Vec<PhysicalCart> = carts.values().cloned().collect();
        all.sort_by_key(|c| c.cart_number);
        Ok(all)
    }

    async fn claim(&self, id: &CartId) -> Result<bool> {
        let mut carts = self.carts.write().await;
        match carts.get_mut(id) {
            Some(cart) if cart.is_available => {
                cart.is_available = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, id: &CartId) -> Result<bool> {
        let mut carts = self.carts.write().await;
        match carts.get_mut(id) {
            Some(cart) if !cart.is_available => {
                cart.is_available = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// A thread-safe in-memory store of shopping sessions, active and ended.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id) {
            Some(stored) if stored.is_active => {
                *stored = session.clone();
                Ok(())
            }
            _ => Err(CartError::NoActiveSession),
        }
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(id).cloned())
    }

    async fn active_for_shopper(&self, shopper: &ShopperId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .find(|s| s.is_active && &s.shopper == shopper)
            .cloned())
    }

    async fn active_for_cart(&self, cart: &CartId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .find(|s| s.is_active && &s.cart_id == cart)
            .cloned())
    }

    async fn all_active(&self) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.values().filter(|s| s.is_active).cloned().collect())
    }

    async fn close(
        &self,
        id: &SessionId,
        reason: EndReason,
        at: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) if session.is_active => {
                session.close(reason, at);
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }
}

/// A thread-safe in-memory store of checkout tickets, one per shopper.
#[derive(Default, Clone)]
pub struct InMemoryTicketStore {
    tickets: Arc<RwLock<HashMap<ShopperId, CheckoutTicket>>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn upsert(&self, ticket: CheckoutTicket) -> Result<()> {
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.shopper.clone(), ticket);
        Ok(())
    }

    async fn get(&self, shopper: &ShopperId) -> Result<Option<CheckoutTicket>> {
        let tickets = self.tickets.read().await;
        Ok(tickets.get(shopper).cloned())
    }

    async fn mark_verified(&self, shopper: &ShopperId, at: DateTime<Utc>) -> Result<bool> {
        let mut tickets = self.tickets.write().await;
        match tickets.get_mut(shopper) {
            Some(ticket) if !ticket.verified => {
                ticket.verified = true;
                ticket.verified_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// A thread-safe append-only in-memory order ledger.
#[derive(Default, Clone)]
pub struct InMemoryOrderLedger {
    orders: Arc<RwLock<Vec<Order>>>,
}

impl InMemoryOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrderLedger {
    async fn append(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.push(order);
        Ok(())
    }

    async fn for_shopper(&self, shopper: &ShopperId) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut mine: Vec<Order> = orders
            .iter()
            .filter(|o| &o.shopper == shopper)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mine)
    }

    async fn all(&self) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.clone())
    }
}

impl Stores {
    /// Fresh, empty in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            catalog: Arc::new(InMemoryCatalogStore::new()),
            carts: Arc::new(InMemoryCartRegistry::new()),
            sessions: Arc::new(InMemorySessionStore::new()),
            tickets: Arc::new(InMemoryTicketStore::new()),
            orders: Arc::new(InMemoryOrderLedger::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use rust_decimal_macros::dec;

    fn apple(stock: u32) -> Product {
        Product::new(
            ProductId::new("apple"),
            "Apple",
            Money::new(dec!(2.50)).unwrap(),
            stock,
            Some("53EEC752110001".to_string()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_catalog_store() {
        let store = InMemoryCatalogStore::new();
        store.insert(apple(100)).await.unwrap();

        let by_id = store.get(&ProductId::new("apple")).await.unwrap().unwrap();
        assert_eq!(by_id.name, "Apple");
        let by_tag = store.find_by_rfid("53EEC752110001").await.unwrap().unwrap();
        assert_eq!(by_tag.id, by_id.id);
        assert!(store.find_by_rfid("UNKNOWN").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_catalog_rejects_duplicate_tag() {
        let store = InMemoryCatalogStore::new();
        store.insert(apple(1)).await.unwrap();

        let mut twin = apple(1);
        twin.id = ProductId::new("apple-2");
        assert!(matches!(
            store.insert(twin).await,
            Err(CartError::DuplicateRfidTag(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_conditional_decrement() {
        let store = InMemoryCatalogStore::new();
        store.insert(apple(2)).await.unwrap();
        let id = ProductId::new("apple");

        assert_eq!(
            store.decrement_stock(&id, 3).await.unwrap(),
            StockAdjustment::Insufficient { available: 2 }
        );
        assert_eq!(
            store.decrement_stock(&id, 2).await.unwrap(),
            StockAdjustment::Applied(0)
        );
        assert_eq!(
            store.increment_stock(&id, 2).await.unwrap(),
            StockAdjustment::Applied(2)
        );
        assert_eq!(
            store
                .decrement_stock(&ProductId::new("ghost"), 1)
                .await
                .unwrap(),
            StockAdjustment::Missing
        );
    }

    #[tokio::test]
    async fn test_in_memory_cart_claim_and_release() {
        let registry = InMemoryCartRegistry::new();
        let cart = PhysicalCart::new(1, "CART001");
        let id = cart.id.clone();
        registry.insert(cart).await.unwrap();

        assert!(registry.claim(&id).await.unwrap());
        assert!(!registry.claim(&id).await.unwrap());
        assert!(registry.release(&id).await.unwrap());
        assert!(!registry.release(&id).await.unwrap());
        assert!(!registry.claim(&CartId::new("ghost")).await.unwrap());

        assert!(matches!(
            registry.insert(PhysicalCart::new(2, "CART001")).await,
            Err(CartError::DuplicateBarcode(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_session_close_is_conditional() {
        let store = InMemorySessionStore::new();
        let session = Session::new(ShopperId::new("alice"), CartId::new("c1"), Utc::now());
        let id = session.id.clone();
        store.insert(session).await.unwrap();

        assert!(store.active_for_cart(&CartId::new("c1")).await.unwrap().is_some());
        let closed = store.close(&id, EndReason::Shopper, Utc::now()).await.unwrap();
        assert!(closed.is_some());
        assert!(store.close(&id, EndReason::Shopper, Utc::now()).await.unwrap().is_none());
        assert!(store
            .active_for_shopper(&ShopperId::new("alice"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_in_memory_order_ledger_newest_first() {
        use crate::domain::checkout::PaymentMethod;
        let ledger = InMemoryOrderLedger::new();
        let alice = ShopperId::new("alice");
        let earlier = Utc::now() - chrono::Duration::minutes(10);
        let first = Order::completed(
            alice.clone(),
            Vec::new(),
            Money::ZERO,
            PaymentMethod::MobileWallet,
            None,
            earlier,
        );
        let second = Order::completed(
            alice.clone(),
            Vec::new(),
            Money::ZERO,
            PaymentMethod::MobileWallet,
            None,
            Utc::now(),
        );
        ledger.append(first.clone()).await.unwrap();
        ledger.append(second.clone()).await.unwrap();

        let history = ledger.for_shopper(&alice).await.unwrap();
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);
        assert!(ledger
            .for_shopper(&ShopperId::new("bob"))
            .await
            .unwrap()
            .is_empty());
    }
}
