use crate::domain::ids::{CartId, ProductId, SessionId, ShopperId};
use crate::domain::ports::{ClockRef, Stores};
use crate::domain::session::{EndReason, Session, SessionView, ToggleOutcome};
use crate::error::{CartError, Result};
use crate::locks::{KeyGuard, KeyedLocks};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Returned by [`SessionManager::start_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStarted {
    pub session_id: SessionId,
    pub cart_number: u32,
}

/// Owns the lifecycle of shopping sessions and the carts they hold.
///
/// Every mutation of one shopper's session runs under that shopper's lock,
/// so the read-items / compute / write-items cycle never interleaves. Cart
/// claims and releases additionally run under the cart's lock, always taken
/// after the shopper's.
pub struct SessionManager {
    stores: Stores,
    clock: ClockRef,
    shopper_locks: KeyedLocks<ShopperId>,
    cart_locks: Arc<KeyedLocks<CartId>>,
}

impl SessionManager {
    pub fn new(stores: Stores, clock: ClockRef, cart_locks: Arc<KeyedLocks<CartId>>) -> Self {
        Self {
            stores,
            clock,
            shopper_locks: KeyedLocks::new(),
            cart_locks,
        }
    }

    /// Binds a free cart to the shopper, ending any session they still hold.
    pub async fn start_session(
        &self,
        shopper: &ShopperId,
        cart_barcode: &str,
    ) -> Result<SessionStarted> {
        let barcode = cart_barcode.trim();
        if barcode.is_empty() {
            return Err(CartError::MissingField("cart_barcode"));
        }

        let _shopper_guard = self.lock_shopper(shopper).await;

        let cart = self
            .stores
            .carts
            .find_by_barcode(barcode)
            .await?
            .ok_or_else(|| CartError::CartUnavailable(barcode.to_string()))?;

        let prior = self.stores.sessions.active_for_shopper(shopper).await?;
        let rescanning_own_cart = prior.as_ref().is_some_and(|s| s.cart_id == cart.id);
        if !cart.is_available && !rescanning_own_cart {
            return Err(CartError::CartUnavailable(barcode.to_string()));
        }

        // The prior cart must be back on the floor before the new one is
        // claimed, or a retried start could leave the shopper holding two.
        if let Some(prior) = prior {
            self.terminate(&prior, EndReason::Superseded).await?;
        }

        let _cart_guard = self.cart_locks.lock(&cart.id).await;
        if !self.stores.carts.claim(&cart.id).await? {
            return Err(CartError::CartUnavailable(barcode.to_string()));
        }

        let session = Session::new(shopper.clone(), cart.id.clone(), self.clock.now());
        let session_id = session.id.clone();
        if let Err(e) = self.stores.sessions.insert(session).await {
            if let Err(release_err) = self.stores.carts.release(&cart.id).await {
                warn!(cart_id = %cart.id, error = %release_err, "Failed to release cart after aborted start");
            }
            return Err(e);
        }

        info!(shopper = %shopper, session_id = %session_id, cart_number = cart.cart_number, "Shopping session started");
        Ok(SessionStarted {
            session_id,
            cart_number: cart.cart_number,
        })
    }

    /// Ends the shopper's active session, if any. Succeeds either way.
    pub async fn end_session(&self, shopper: &ShopperId) -> Result<bool> {
        let _guard = self.lock_shopper(shopper).await;
        match self.stores.sessions.active_for_shopper(shopper).await? {
            Some(session) => self.terminate(&session, EndReason::Shopper).await,
            None => Ok(false),
        }
    }

    /// Adds one unit of the product carrying `rfid_tag`.
    pub async fn scan_product(&self, shopper: &ShopperId, rfid_tag: &str) -> Result<SessionView> {
        let _guard = self.lock_shopper(shopper).await;
        let mut session = self.require_active(shopper).await?;
        let product = self.resolve_tag(rfid_tag).await?;

        session.scan(&product, self.clock.now())?;
        self.stores.sessions.save(&session).await?;

        debug!(shopper = %shopper, product_id = %product.id, total = %session.total_amount, "Product scanned");
        self.view_of(&session).await
    }

    /// Removes the tagged product's whole line, or adds one unit if absent.
    pub async fn toggle_product(
        &self,
        shopper: &ShopperId,
        rfid_tag: &str,
    ) -> Result<(ToggleOutcome, SessionView)> {
        let _guard = self.lock_shopper(shopper).await;
        let mut session = self.require_active(shopper).await?;
        let product = self.resolve_tag(rfid_tag).await?;

        let outcome = session.toggle(&product, self.clock.now())?;
        self.stores.sessions.save(&session).await?;

        debug!(shopper = %shopper, product_id = %product.id, ?outcome, "Product toggled");
        Ok((outcome, self.view_of(&session).await?))
    }

    /// Takes one unit of the product off the cart.
    pub async fn remove_from_cart(
        &self,
        shopper: &ShopperId,
        product_id: &ProductId,
    ) -> Result<SessionView> {
        let _guard = self.lock_shopper(shopper).await;
        let mut session = self.require_active(shopper).await?;

        session.remove_one(product_id, self.clock.now())?;
        self.stores.sessions.save(&session).await?;

        debug!(shopper = %shopper, product_id = %product_id, "Product removed");
        self.view_of(&session).await
    }

    /// The shopper's cart, or an empty view when no session is active.
    pub async fn get_session(&self, shopper: &ShopperId) -> Result<SessionView> {
        match self.stores.sessions.active_for_shopper(shopper).await? {
            Some(session) => self.view_of(&session).await,
            None => Ok(SessionView::empty()),
        }
    }

    /// Force-closes every active session and frees its cart. Returns how
    /// many sessions this call closed.
    ///
    /// A session that fails to close does not stop the sweep: every other
    /// session is still closed, then the first failure is returned.
    pub async fn end_all_sessions(&self, reason: EndReason) -> Result<usize> {
        let mut closed = 0;
        let mut first_failure = None;
        for session in self.stores.sessions.all_active().await? {
            let _guard = self.lock_shopper(&session.shopper).await;
            match self.terminate(&session, reason).await {
                Ok(true) => closed += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(shopper = %session.shopper, session_id = %session.id, error = %e, "Failed to end session");
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }

        match first_failure {
            Some(e) => {
                warn!(closed, ?reason, "Ended active sessions with failures");
                Err(e)
            }
            None => {
                info!(closed, ?reason, "Ended all active sessions");
                Ok(closed)
            }
        }
    }

    pub(crate) async fn lock_shopper(&self, shopper: &ShopperId) -> KeyGuard<'_, ShopperId> {
        self.shopper_locks.lock(shopper).await
    }

    /// Close-if-active, then release the cart. Only the caller whose close
    /// succeeded releases, and it does so under the cart lock.
    pub(crate) async fn terminate(&self, session: &Session, reason: EndReason) -> Result<bool> {
        let _cart_guard = self.cart_locks.lock(&session.cart_id).await;
        let Some(closed) = self
            .stores
            .sessions
            .close(&session.id, reason, self.clock.now())
            .await?
        else {
            return Ok(false);
        };

        self.stores.carts.release(&closed.cart_id).await?;
        info!(shopper = %closed.shopper, session_id = %closed.id, ?reason, "Shopping session ended");
        Ok(true)
    }

    async fn require_active(&self, shopper: &ShopperId) -> Result<Session> {
        self.stores
            .sessions
            .active_for_shopper(shopper)
            .await?
            .ok_or(CartError::NoActiveSession)
    }

    async fn resolve_tag(&self, rfid_tag: &str) -> Result<crate::domain::product::Product> {
        let tag = rfid_tag.trim();
        if tag.is_empty() {
            return Err(CartError::MissingField("rfid_tag"));
        }
        self.stores
            .catalog
            .find_by_rfid(tag)
            .await?
            .ok_or_else(|| CartError::ProductNotFound(tag.to_string()))
    }

    async fn view_of(&self, session: &Session) -> Result<SessionView> {
        let cart_number = self
            .stores
            .carts
            .get(&session.cart_id)
            .await?
            .map(|cart| cart.cart_number);
        Ok(SessionView::of(session, cart_number))
    }
}
