use super::checkout::{CheckoutCoordinator, CheckoutInitiated};
use super::provisioning::{self, ProvisionReport, SeedReport};
use super::rfid::{CartStatus, RfidResolver};
use super::sessions::{SessionManager, SessionStarted};
use crate::domain::cart::PhysicalCart;
use crate::domain::checkout::CheckoutPolicy;
use crate::domain::identity::{Identity, Role};
use crate::domain::ids::{ProductId, ShopperId};
use crate::domain::order::Order;
use crate::domain::ports::{ClockRef, IdentityProviderRef, OtpNotifierRef, Stores};
use crate::domain::product::Product;
use crate::domain::session::{EndReason, SessionView, ToggleOutcome};
use crate::error::{CartError, Result};
use crate::locks::KeyedLocks;
use std::sync::Arc;

/// Request-facing entry point.
///
/// Shopper operations take the caller's credential and act on the shopper
/// it resolves to. Reader queries are open. Provisioning and bulk session
/// cleanup need an admin.
pub struct ShopService {
    identity: IdentityProviderRef,
    stores: Stores,
    sessions: Arc<SessionManager>,
    checkout: CheckoutCoordinator,
    rfid: RfidResolver,
}

impl ShopService {
    pub fn new(
        stores: Stores,
        identity: IdentityProviderRef,
        notifier: OtpNotifierRef,
        clock: ClockRef,
        policy: CheckoutPolicy,
    ) -> Self {
        let cart_locks = Arc::new(KeyedLocks::new());
        let sessions = Arc::new(SessionManager::new(
            stores.clone(),
            clock.clone(),
            cart_locks.clone(),
        ));
        let checkout = CheckoutCoordinator::new(
            sessions.clone(),
            stores.clone(),
            notifier,
            clock,
            policy,
        );
        let rfid = RfidResolver::new(stores.clone(), cart_locks);
        Self {
            identity,
            stores,
            sessions,
            checkout,
            rfid,
        }
    }

    pub async fn start_session(&self, credential: &str, cart_barcode: &str) -> Result<SessionStarted> {
        let shopper = self.shopper(credential).await?;
        self.sessions.start_session(&shopper, cart_barcode).await
    }

    pub async fn end_session(&self, credential: &str) -> Result<bool> {
        let shopper = self.shopper(credential).await?;
        self.sessions.end_session(&shopper).await
    }

    pub async fn scan_product(&self, credential: &str, rfid_tag: &str) -> Result<SessionView> {
        let shopper = self.shopper(credential).await?;
        self.sessions.scan_product(&shopper, rfid_tag).await
    }

    pub async fn toggle_product(
        &self,
        credential: &str,
        rfid_tag: &str,
    ) -> Result<(ToggleOutcome, SessionView)> {
        let shopper = self.shopper(credential).await?;
        self.sessions.toggle_product(&shopper, rfid_tag).await
    }

    pub async fn remove_from_cart(&self, credential: &str, product_id: &str) -> Result<SessionView> {
        let shopper = self.shopper(credential).await?;
        let product_id = product_id.trim();
        if product_id.is_empty() {
            return Err(CartError::MissingField("product_id"));
        }
        self.sessions
            .remove_from_cart(&shopper, &ProductId::new(product_id))
            .await
    }

    pub async fn get_session(&self, credential: &str) -> Result<SessionView> {
        let shopper = self.shopper(credential).await?;
        self.sessions.get_session(&shopper).await
    }

    pub async fn initiate_checkout(
        &self,
        credential: &str,
        payment_method: &str,
        card_number: Option<&str>,
    ) -> Result<CheckoutInitiated> {
        let shopper = self.shopper(credential).await?;
        self.checkout
            .initiate_checkout(&shopper, payment_method, card_number)
            .await
    }

    pub async fn verify_checkout(&self, credential: &str, code: &str) -> Result<Order> {
        let shopper = self.shopper(credential).await?;
        self.checkout.verify_checkout(&shopper, code).await
    }

    pub async fn order_history(&self, credential: &str) -> Result<Vec<Order>> {
        let shopper = self.shopper(credential).await?;
        self.checkout.order_history(&shopper).await
    }

    pub async fn resolve_cart(&self, cart_uid: &str) -> Result<CartStatus> {
        self.rfid.resolve_cart(cart_uid).await
    }

    pub async fn lookup_product(&self, rfid_tag: &str) -> Result<Product> {
        self.rfid.lookup_product(rfid_tag).await
    }

    pub async fn list_carts(&self) -> Result<Vec<PhysicalCart>> {
        self.rfid.list_carts().await
    }

    /// Admin cleanup of every active session.
    pub async fn end_all_sessions(&self, credential: &str) -> Result<usize> {
        self.admin(credential).await?;
        self.sessions.end_all_sessions(EndReason::ManualCleanup).await
    }

    pub async fn provision_carts(&self, credential: &str, count: u32) -> Result<ProvisionReport> {
        self.admin(credential).await?;
        provisioning::provision_carts(self.stores.carts.as_ref(), count).await
    }

    pub async fn seed_catalog(&self, credential: &str, products: Vec<Product>) -> Result<SeedReport> {
        self.admin(credential).await?;
        provisioning::seed_catalog(self.stores.catalog.as_ref(), products).await
    }

    /// Closes every active session on the way down. Not reachable by
    /// credentials; the host process calls it.
    pub async fn shutdown(&self) -> Result<usize> {
        self.sessions.end_all_sessions(EndReason::SystemShutdown).await
    }

    async fn authenticate(&self, credential: &str) -> Result<Identity> {
        self.identity.authenticate(credential).await
    }

    async fn admin(&self, credential: &str) -> Result<Identity> {
        let identity = self.authenticate(credential).await?;
        if identity.role != Role::Admin {
            return Err(CartError::Forbidden(format!(
                "{} is not an admin account",
                identity.id
            )));
        }
        Ok(identity)
    }

    /// Resolves a credential to the shopper it authenticates.
    pub async fn shopper(&self, credential: &str) -> Result<ShopperId> {
        let identity = self.authenticate(credential).await?;
        match identity.role {
            Role::Shopper => Ok(identity.id),
            Role::Admin => Err(CartError::Forbidden(format!(
                "{} is not a shopper account",
                identity.id
            ))),
        }
    }
}
