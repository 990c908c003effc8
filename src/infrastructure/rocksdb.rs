use crate::domain::cart::PhysicalCart;
use crate::domain::checkout::CheckoutTicket;
use crate::domain::ids::{CartId, ProductId, SessionId, ShopperId};
use crate::domain::order::Order;
use crate::domain::ports::{CartRegistry, CatalogStore, OrderLedger, SessionStore, Stores, TicketStore};
use crate::domain::product::{Product, StockAdjustment};
use crate::domain::session::{EndReason, Session};
use crate::error::{CartError, Result};
use crate::locks::KeyedLocks;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for catalog products, keyed by product id.
pub const CF_PRODUCTS: &str = "products";
/// Column Family for physical carts, keyed by cart id.
pub const CF_CARTS: &str = "carts";
/// Column Family for sessions, keyed by session id.
pub const CF_SESSIONS: &str = "sessions";
/// Column Family for checkout tickets, keyed by shopper id.
pub const CF_TICKETS: &str = "tickets";
/// Column Family for orders, keyed by creation time then order id.
pub const CF_ORDERS: &str = "orders";
/// Index: RFID tag to product id.
pub const CF_PRODUCT_TAGS: &str = "product_tags";
/// Index: barcode to cart id.
pub const CF_CART_BARCODES: &str = "cart_barcodes";
/// Index: shopper id to the id of their active session.
pub const CF_ACTIVE_BY_SHOPPER: &str = "active_by_shopper";
/// Index: cart id to the id of the active session holding it.
pub const CF_ACTIVE_BY_CART: &str = "active_by_cart";

const COLUMN_FAMILIES: [&str; 9] = [
    CF_PRODUCTS,
    CF_CARTS,
    CF_SESSIONS,
    CF_TICKETS,
    CF_ORDERS,
    CF_PRODUCT_TAGS,
    CF_CART_BARCODES,
    CF_ACTIVE_BY_SHOPPER,
    CF_ACTIVE_BY_CART,
];

/// A persistent store implementation using RocksDB.
///
/// Implements every store port over separate Column Families. RocksDB has no
/// compare-and-swap, so each conditional write runs its read-modify-write
/// under a per-key lock held only for that single write.
///
/// Lookups by tag, barcode, shopper and cart go through index Column
/// Families. Index entries are written before the record they point to and
/// removed after it changes, and every lookup re-checks the record, so an
/// entry left stale by a crash reads as a miss.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    locks: Arc<KeyedLocks<String>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            locks: Arc::new(KeyedLocks::new()),
        })
    }

    /// Every port backed by this one database.
    pub fn stores(&self) -> Stores {
        Stores {
            catalog: Arc::new(self.clone()),
            carts: Arc::new(self.clone()),
            sessions: Arc::new(self.clone()),
            tickets: Arc::new(self.clone()),
            orders: Arc::new(self.clone()),
        }
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| CartError::internal(format!("{name} column family not found")))
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn put_index(&self, index: &str, key: &str, id: &str) -> Result<()> {
        self.db.put_cf(self.cf(index)?, key.as_bytes(), id.as_bytes())?;
        Ok(())
    }

    /// Removes `key` from the index only while it still points at `id`.
    fn unlink_index(&self, index: &str, key: &str, id: &str) -> Result<()> {
        let cf = self.cf(index)?;
        if self.db.get_cf(cf, key.as_bytes())?.as_deref() == Some(id.as_bytes()) {
            self.db.delete_cf(cf, key.as_bytes())?;
        }
        Ok(())
    }

    /// Follows an index entry to the record it names.
    fn get_indexed<T: DeserializeOwned>(&self, index: &str, key: &str, cf_name: &str) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(index)?, key.as_bytes())? {
            Some(id) => self.get_json(cf_name, &id),
            None => Ok(None),
        }
    }

    fn order_key(order: &Order) -> Vec<u8> {
        let mut key = order.created_at.timestamp_micros().to_be_bytes().to_vec();
        key.extend_from_slice(order.id.as_str().as_bytes());
        key
    }
}

#[async_trait]
impl CatalogStore for RocksDBStore {
    async fn insert(&self, product: Product) -> Result<()> {
        let _catalog_guard = self.locks.lock(&"catalog".to_string()).await;
        let _product_guard = self.locks.lock(&format!("product:{}", product.id)).await;
        let id = product.id.as_str();

        if let Some(tag) = &product.rfid_tag {
            if let Some(owner) = self.find_by_rfid(tag).await? {
                if owner.id != product.id {
                    return Err(CartError::DuplicateRfidTag(tag.clone()));
                }
            }
            self.put_index(CF_PRODUCT_TAGS, tag, id)?;
        }

        let previous = self.get_json::<Product>(CF_PRODUCTS, id.as_bytes())?;
        self.put_json(CF_PRODUCTS, id.as_bytes(), &product)?;

        if let Some(old_tag) = previous.and_then(|p| p.rfid_tag) {
            if product.rfid_tag.as_ref() != Some(&old_tag) {
                self.unlink_index(CF_PRODUCT_TAGS, &old_tag, id)?;
            }
        }
        Ok(())
    }

    async fn get(&self, id: &ProductId) -> Result<Option<Product>> {
        self.get_json(CF_PRODUCTS, id.as_str().as_bytes())
    }

    async fn find_by_rfid(&self, rfid_tag: &str) -> Result<Option<Product>> {
        Ok(self
            .get_indexed::<Product>(CF_PRODUCT_TAGS, rfid_tag, CF_PRODUCTS)?
            .filter(|p| p.rfid_tag.as_deref() == Some(rfid_tag)))
    }

    async fn all(&self) -> Result<Vec<Product>> {
        let mut all = self.scan_json::<Product>(CF_PRODUCTS)?;
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn decrement_stock(&self, id: &ProductId, quantity: u32) -> Result<StockAdjustment> {
        let _guard = self.locks.lock(&format!("product:{id}")).await;
        let Some(mut product) = self.get_json::<Product>(CF_PRODUCTS, id.as_str().as_bytes())? else {
            return Ok(StockAdjustment::Missing);
        };
        if product.stock_quantity < quantity {
            return Ok(StockAdjustment::Insufficient {
                available: product.stock_quantity,
            });
        }
        product.stock_quantity -= quantity;
        self.put_json(CF_PRODUCTS, id.as_str().as_bytes(), &product)?;
        Ok(StockAdjustment::Applied(product.stock_quantity))
    }

    async fn increment_stock(&self, id: &ProductId, quantity: u32) -> Result<StockAdjustment> {
        let _guard = self.locks.lock(&format!("product:{id}")).await;
        let Some(mut product) = self.get_json::<Product>(CF_PRODUCTS, id.as_str().as_bytes())? else {
            return Ok(StockAdjustment::Missing);
        };
        product.stock_quantity = product.stock_quantity.saturating_add(quantity);
        self.put_json(CF_PRODUCTS, id.as_str().as_bytes(), &product)?;
        Ok(StockAdjustment::Applied(product.stock_quantity))
    }
}

#[async_trait]
impl CartRegistry for RocksDBStore {
    async fn insert(&self, cart: PhysicalCart) -> Result<()> {
        let _carts_guard = self.locks.lock(&"carts".to_string()).await;
        let _cart_guard = self.locks.lock(&format!("cart:{}", cart.id)).await;
        let id = cart.id.as_str();

        if let Some(owner) = self.find_by_barcode(&cart.barcode).await? {
            if owner.id != cart.id {
                return Err(CartError::DuplicateBarcode(cart.barcode));
            }
        }
        self.put_index(CF_CART_BARCODES, &cart.barcode, id)?;

        let previous = self.get_json::<PhysicalCart>(CF_CARTS, id.as_bytes())?;
        self.put_json(CF_CARTS, id.as_bytes(), &cart)?;

        if let Some(previous) = previous {
            if previous.barcode != cart.barcode {
                self.unlink_index(CF_CART_BARCODES, &previous.barcode, id)?;
            }
        }
        Ok(())
    }

    async fn get(&self, id: &CartId) -> Result<Option<PhysicalCart>> {
        self.get_json(CF_CARTS, id.as_str().as_bytes())
    }

    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<PhysicalCart>> {
        Ok(self
            .get_indexed::<PhysicalCart>(CF_CART_BARCODES, barcode, CF_CARTS)?
            .filter(|c| c.barcode == barcode))
    }

    async fn all(&self) -> Result<Vec<PhysicalCart>> {
        let mut all = self.scan_json::<PhysicalCart>(CF_CARTS)?;
        all.sort_by_key(|c| c.cart_number);
        Ok(all)
    }

    async fn claim(&self, id: &CartId) -> Result<bool> {
        let _guard = self.locks.lock(&format!("cart:{id}")).await;
        match self.get_json::<PhysicalCart>(CF_CARTS, id.as_str().as_bytes())? {
            Some(mut cart) if cart.is_available => {
                cart.is_available = false;
                self.put_json(CF_CARTS, id.as_str().as_bytes(), &cart)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, id: &CartId) -> Result<bool> {
        let _guard = self.locks.lock(&format!("cart:{id}")).await;
        match self.get_json::<PhysicalCart>(CF_CARTS, id.as_str().as_bytes())? {
            Some(mut cart) if !cart.is_available => {
                cart.is_available = true;
                self.put_json(CF_CARTS, id.as_str().as_bytes(), &cart)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SessionStore for RocksDBStore {
    async fn insert(&self, session: Session) -> Result<()> {
        let _guard = self.locks.lock(&format!("session:{}", session.id)).await;
        let id = session.id.as_str();
        if session.is_active {
            self.put_index(CF_ACTIVE_BY_SHOPPER, session.shopper.as_str(), id)?;
            self.put_index(CF_ACTIVE_BY_CART, session.cart_id.as_str(), id)?;
        }
        self.put_json(CF_SESSIONS, id.as_bytes(), &session)
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let _guard = self.locks.lock(&format!("session:{}", session.id)).await;
        match self.get_json::<Session>(CF_SESSIONS, session.id.as_str().as_bytes())? {
            Some(stored) if stored.is_active => {
                self.put_json(CF_SESSIONS, session.id.as_str().as_bytes(), session)
            }
            _ => Err(CartError::NoActiveSession),
        }
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        self.get_json(CF_SESSIONS, id.as_str().as_bytes())
    }

    async fn active_for_shopper(&self, shopper: &ShopperId) -> Result<Option<Session>> {
        Ok(self
            .get_indexed::<Session>(CF_ACTIVE_BY_SHOPPER, shopper.as_str(), CF_SESSIONS)?
            .filter(|s| s.is_active && &s.shopper == shopper))
    }

    async fn active_for_cart(&self, cart: &CartId) -> Result<Option<Session>> {
        Ok(self
            .get_indexed::<Session>(CF_ACTIVE_BY_CART, cart.as_str(), CF_SESSIONS)?
            .filter(|s| s.is_active && &s.cart_id == cart))
    }

    async fn all_active(&self) -> Result<Vec<Session>> {
        let cf = self.cf(CF_ACTIVE_BY_SHOPPER)?;
        let mut active = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_shopper, id) = item?;
            if let Some(session) = self.get_json::<Session>(CF_SESSIONS, &id)? {
                if session.is_active {
                    active.push(session);
                }
            }
        }
        Ok(active)
    }

    async fn close(
        &self,
        id: &SessionId,
        reason: EndReason,
        at: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let _guard = self.locks.lock(&format!("session:{id}")).await;
        match self.get_json::<Session>(CF_SESSIONS, id.as_str().as_bytes())? {
            Some(mut session) if session.is_active => {
                session.close(reason, at);
                self.put_json(CF_SESSIONS, id.as_str().as_bytes(), &session)?;
                self.unlink_index(CF_ACTIVE_BY_SHOPPER, session.shopper.as_str(), id.as_str())?;
                self.unlink_index(CF_ACTIVE_BY_CART, session.cart_id.as_str(), id.as_str())?;
                Ok(Some(session))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl TicketStore for RocksDBStore {
    async fn upsert(&self, ticket: CheckoutTicket) -> Result<()> {
        let _guard = self.locks.lock(&format!("ticket:{}", ticket.shopper)).await;
        self.put_json(CF_TICKETS, ticket.shopper.as_str().as_bytes(), &ticket)
    }

    async fn get(&self, shopper: &ShopperId) -> Result<Option<CheckoutTicket>> {
        self.get_json(CF_TICKETS, shopper.as_str().as_bytes())
    }

    async fn mark_verified(&self, shopper: &ShopperId, at: DateTime<Utc>) -> Result<bool> {
        let _guard = self.locks.lock(&format!("ticket:{shopper}")).await;
        match self.get_json::<CheckoutTicket>(CF_TICKETS, shopper.as_str().as_bytes())? {
            Some(mut ticket) if !ticket.verified => {
                ticket.verified = true;
                ticket.verified_at = Some(at);
                self.put_json(CF_TICKETS, shopper.as_str().as_bytes(), &ticket)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl OrderLedger for RocksDBStore {
    async fn append(&self, order: Order) -> Result<()> {
        self.put_json(CF_ORDERS, &Self::order_key(&order), &order)
    }

    async fn for_shopper(&self, shopper: &ShopperId) -> Result<Vec<Order>> {
        let mut mine: Vec<Order> = self
            .scan_json::<Order>(CF_ORDERS)?
            .into_iter()
            .filter(|o| &o.shopper == shopper)
            .collect();
        mine.reverse();
        Ok(mine)
    }

    async fn all(&self) -> Result<Vec<Order>> {
        self.scan_json(CF_ORDERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkout::PaymentMethod;
    use crate::domain::money::Money;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

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
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some(), "missing {name}");
        }
    }

    #[tokio::test]
    async fn test_rocksdb_catalog_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let id = ProductId::new("apple");

        CatalogStore::insert(&store, apple(2)).await.unwrap();
        let found = store.find_by_rfid("53EEC752110001").await.unwrap().unwrap();
        assert_eq!(found.id, id);

        assert_eq!(
            store.decrement_stock(&id, 3).await.unwrap(),
            StockAdjustment::Insufficient { available: 2 }
        );
        assert_eq!(
            store.decrement_stock(&id, 2).await.unwrap(),
            StockAdjustment::Applied(0)
        );
        let reread = CatalogStore::get(&store, &id).await.unwrap().unwrap();
        assert_eq!(reread.stock_quantity, 0);
    }

    #[tokio::test]
    async fn test_rocksdb_cart_registry() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let cart = PhysicalCart::new(1, "CART001");
        let id = cart.id.clone();

        CartRegistry::insert(&store, cart).await.unwrap();
        assert!(store.claim(&id).await.unwrap());
        assert!(!store.claim(&id).await.unwrap());
        let stored = store.find_by_barcode("CART001").await.unwrap().unwrap();
        assert!(!stored.is_available);
        assert!(store.release(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_rocksdb_session_and_ticket_stores() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let alice = ShopperId::new("alice");

        let session = Session::new(alice.clone(), CartId::new("c1"), Utc::now());
        let id = session.id.clone();
        SessionStore::insert(&store, session).await.unwrap();
        assert!(store.active_for_shopper(&alice).await.unwrap().is_some());
        assert!(store.close(&id, EndReason::Shopper, Utc::now()).await.unwrap().is_some());
        assert!(store.close(&id, EndReason::Shopper, Utc::now()).await.unwrap().is_none());
        assert!(store.all_active().await.unwrap().is_empty());

        assert!(!store.mark_verified(&alice, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_rocksdb_order_ledger_newest_first() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let alice = ShopperId::new("alice");
        let older = Order::completed(
            alice.clone(),
            Vec::new(),
            Money::ZERO,
            PaymentMethod::MobileWallet,
            None,
            Utc::now() - chrono::Duration::hours(1),
        );
        let newer = Order::completed(
            alice.clone(),
            Vec::new(),
            Money::ZERO,
            PaymentMethod::MobileWallet,
            None,
            Utc::now(),
        );

        store.append(newer.clone()).await.unwrap();
        store.append(older.clone()).await.unwrap();

        let history = store.for_shopper(&alice).await.unwrap();
        assert_eq!(history[0].id, newer.id);
        assert_eq!(history[1].id, older.id);
    }

    #[tokio::test]
    async fn test_rocksdb_tag_index_follows_updates() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        CatalogStore::insert(&store, apple(5)).await.unwrap();

        let mut retagged = apple(5);
        retagged.rfid_tag = Some("AA00BB11".to_string());
        CatalogStore::insert(&store, retagged).await.unwrap();
        assert!(store.find_by_rfid("53EEC752110001").await.unwrap().is_none());
        assert_eq!(
            store.find_by_rfid("AA00BB11").await.unwrap().unwrap().id,
            ProductId::new("apple")
        );

        let clash = Product::new(
            ProductId::new("pear"),
            "Pear",
            Money::new(dec!(1.00)).unwrap(),
            1,
            Some("AA00BB11".to_string()),
        )
        .unwrap();
        assert!(matches!(
            CatalogStore::insert(&store, clash).await,
            Err(CartError::DuplicateRfidTag(_))
        ));
    }

    #[tokio::test]
    async fn test_rocksdb_barcode_index_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        CartRegistry::insert(&store, PhysicalCart::new(1, "CART001")).await.unwrap();

        assert!(matches!(
            CartRegistry::insert(&store, PhysicalCart::new(2, "CART001")).await,
            Err(CartError::DuplicateBarcode(_))
        ));
        assert!(store.find_by_barcode("CART002").await.unwrap().is_none());
        assert_eq!(
            store.find_by_barcode("CART001").await.unwrap().unwrap().cart_number,
            1
        );
    }

    #[tokio::test]
    async fn test_rocksdb_active_index_ignores_history() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let alice = ShopperId::new("alice");
        let cart = CartId::new("c1");

        for _ in 0..20 {
            let session = Session::new(alice.clone(), cart.clone(), Utc::now());
            let id = session.id.clone();
            SessionStore::insert(&store, session).await.unwrap();
            store.close(&id, EndReason::Shopper, Utc::now()).await.unwrap();
        }
        assert!(store.active_for_shopper(&alice).await.unwrap().is_none());
        assert!(store.active_for_cart(&cart).await.unwrap().is_none());

        let current = Session::new(alice.clone(), cart.clone(), Utc::now());
        let current_id = current.id.clone();
        SessionStore::insert(&store, current).await.unwrap();
        assert_eq!(
            store.active_for_cart(&cart).await.unwrap().unwrap().id,
            current_id
        );
        let active = store.all_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, current_id);
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn test_rocksdb_insert_waits_for_stock_writers() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        CatalogStore::insert(&store, apple(5)).await.unwrap();

        let held = store.locks.lock(&"product:apple".to_string()).await;
        let writer = {
            let store = store.clone();
            tokio::spawn(async move { CatalogStore::insert(&store, apple(9)).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        drop(held);
        writer.await.unwrap().unwrap();
        let stored = CatalogStore::get(&store, &ProductId::new("apple")).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity, 9);
    }
}
