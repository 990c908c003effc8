//! Store and collaborator boundaries.
//!
//! Every read-modify-write that must hold across concurrent requests is a
//! single conditional method here (`decrement_stock`, `claim`, `close`,
//! `mark_verified`), so implementations can back it with whatever atomic
//! primitive they have.

use super::cart::PhysicalCart;
use super::checkout::{CheckoutTicket, OneTimeCode};
use super::identity::Identity;
use super::ids::{CartId, ProductId, SessionId, ShopperId};
use super::order::Order;
use super::product::{Product, StockAdjustment};
use super::session::{EndReason, Session};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fails with `DuplicateRfidTag` when the tag is already in use.
    async fn insert(&self, product: Product) -> Result<()>;
    async fn get(&self, id: &ProductId) -> Result<Option<Product>>;
    async fn find_by_rfid(&self, rfid_tag: &str) -> Result<Option<Product>>;
    async fn all(&self) -> Result<Vec<Product>>;
    /// Decrement-if-sufficient, atomic with respect to every other caller.
    async fn decrement_stock(&self, id: &ProductId, quantity: u32) -> Result<StockAdjustment>;
    async fn increment_stock(&self, id: &ProductId, quantity: u32) -> Result<StockAdjustment>;
}

#[async_trait]
pub trait CartRegistry: Send + Sync {
    /// Fails with `DuplicateBarcode` when the barcode is already registered.
    async fn insert(&self, cart: PhysicalCart) -> Result<()>;
    async fn get(&self, id: &CartId) -> Result<Option<PhysicalCart>>;
    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<PhysicalCart>>;
    /// All carts ordered by cart number.
    async fn all(&self) -> Result<Vec<PhysicalCart>>;
    /// Claim-if-available. Returns false when the cart is missing or taken.
    async fn claim(&self, id: &CartId) -> Result<bool>;
    /// Returns false when the cart was already available.
    async fn release(&self, id: &CartId) -> Result<bool>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> Result<()>;
    /// Persists item changes of an active session.
    async fn save(&self, session: &Session) -> Result<()>;
    async fn get(&self, id: &SessionId) -> Result<Option<Session>>;
    async fn active_for_shopper(&self, shopper: &ShopperId) -> Result<Option<Session>>;
    async fn active_for_cart(&self, cart: &CartId) -> Result<Option<Session>>;
    async fn all_active(&self) -> Result<Vec<Session>>;
    /// Close-if-active. Returns the closed session only to the caller that
    /// actually closed it, so exactly one caller releases the cart.
    async fn close(
        &self,
        id: &SessionId,
        reason: EndReason,
        at: DateTime<Utc>,
    ) -> Result<Option<Session>>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Replaces any previous ticket of the same shopper.
    async fn upsert(&self, ticket: CheckoutTicket) -> Result<()>;
    async fn get(&self, shopper: &ShopperId) -> Result<Option<CheckoutTicket>>;
    /// Verify-if-unverified. Returns false when already verified or absent.
    async fn mark_verified(&self, shopper: &ShopperId, at: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn append(&self, order: Order) -> Result<()>;
    /// Newest first.
    async fn for_shopper(&self, shopper: &ShopperId) -> Result<Vec<Order>>;
    /// Oldest first.
    async fn all(&self) -> Result<Vec<Order>>;
}

/// Delivery channel for one-time passcodes (e-mail, SMS, ...).
#[async_trait]
pub trait OtpNotifier: Send + Sync {
    async fn send(&self, destination: &ShopperId, code: &OneTimeCode) -> Result<()>;
}

/// Turns a bearer credential into an identity, or `Unauthenticated`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, credential: &str) -> Result<Identity>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type CatalogStoreRef = Arc<dyn CatalogStore>;
pub type CartRegistryRef = Arc<dyn CartRegistry>;
pub type SessionStoreRef = Arc<dyn SessionStore>;
pub type TicketStoreRef = Arc<dyn TicketStore>;
pub type OrderLedgerRef = Arc<dyn OrderLedger>;
pub type OtpNotifierRef = Arc<dyn OtpNotifier>;
pub type IdentityProviderRef = Arc<dyn IdentityProvider>;
pub type ClockRef = Arc<dyn Clock>;

/// The full set of stores one deployment runs against.
#[derive(Clone)]
pub struct Stores {
    pub catalog: CatalogStoreRef,
    pub carts: CartRegistryRef,
    pub sessions: SessionStoreRef,
    pub tickets: TicketStoreRef,
    pub orders: OrderLedgerRef,
}
