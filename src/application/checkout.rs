use super::sessions::SessionManager;
use crate::domain::checkout::{CheckoutPolicy, CheckoutTicket, PaymentDetails, PaymentMethod};
use crate::domain::ids::{ProductId, ShopperId};
use crate::domain::order::Order;
use crate::domain::ports::{ClockRef, OtpNotifierRef, Stores};
use crate::domain::product::StockAdjustment;
use crate::domain::session::{EndReason, LineItem, Session};
use crate::error::{CartError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Returned by [`CheckoutCoordinator::initiate_checkout`]. The code itself
/// only travels through the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutInitiated {
    pub expires_at: DateTime<Utc>,
    pub payment_method: PaymentMethod,
}

/// Units a session asks of one product, summed over its lines.
struct Demand {
    product_id: ProductId,
    name: String,
    quantity: u32,
}

/// Two-phase checkout: a one-time code is issued and sent, then verifying
/// it commits stock, the order, and the end of the session.
pub struct CheckoutCoordinator {
    sessions: Arc<SessionManager>,
    stores: Stores,
    notifier: OtpNotifierRef,
    clock: ClockRef,
    policy: CheckoutPolicy,
}

impl CheckoutCoordinator {
    pub fn new(
        sessions: Arc<SessionManager>,
        stores: Stores,
        notifier: OtpNotifierRef,
        clock: ClockRef,
        policy: CheckoutPolicy,
    ) -> Self {
        Self {
            sessions,
            stores,
            notifier,
            clock,
            policy,
        }
    }

    pub async fn initiate_checkout(
        &self,
        shopper: &ShopperId,
        payment_method: &str,
        card_number: Option<&str>,
    ) -> Result<CheckoutInitiated> {
        let payment = PaymentDetails::parse(payment_method, card_number)?;

        let _guard = self.sessions.lock_shopper(shopper).await;
        let session = self.non_empty_session(shopper).await?;
        self.ensure_stock_covers(&session.items).await?;

        let ticket = CheckoutTicket::issue(
            shopper.clone(),
            payment,
            session.items.clone(),
            session.total_amount,
            &self.policy,
            self.clock.now(),
        );
        let initiated = CheckoutInitiated {
            expires_at: ticket.expires_at,
            payment_method: ticket.payment_method,
        };
        let code = ticket.code.clone();
        self.stores.tickets.upsert(ticket).await?;

        if let Err(e) = self.notifier.send(shopper, &code).await {
            warn!(shopper = %shopper, error = %e, "Failed to deliver one-time code");
            return Err(match e {
                CartError::NotificationFailed(_) => e,
                other => CartError::NotificationFailed(other.to_string()),
            });
        }

        info!(shopper = %shopper, total = %session.total_amount, method = %initiated.payment_method, "Checkout initiated");
        Ok(initiated)
    }

    /// Consumes the shopper's ticket and turns the session into an order.
    ///
    /// Stock is decremented per product with a conditional write; any refusal
    /// restores what was already taken. Once the order is appended the
    /// checkout stands, and failures ending the session or marking the
    /// ticket are only logged.
    pub async fn verify_checkout(&self, shopper: &ShopperId, code: &str) -> Result<Order> {
        if code.trim().is_empty() {
            return Err(CartError::MissingField("otp"));
        }

        let _guard = self.sessions.lock_shopper(shopper).await;
        let now = self.clock.now();

        let ticket = self
            .stores
            .tickets
            .get(shopper)
            .await?
            .filter(|ticket| ticket.is_consumable(now))
            .ok_or(CartError::TicketNotFound)?;
        if !ticket.code.matches(code) {
            warn!(shopper = %shopper, "One-time code mismatch");
            return Err(CartError::InvalidCode);
        }

        let session = self.non_empty_session(shopper).await?;
        self.ensure_stock_covers(&session.items).await?;
        let taken = self.take_stock(&session.items).await?;

        let order = Order::completed(
            shopper.clone(),
            session.items.clone(),
            session.total_amount,
            ticket.payment_method,
            ticket.card.clone(),
            now,
        );
        if let Err(e) = self.stores.orders.append(order.clone()).await {
            error!(shopper = %shopper, error = %e, "Failed to record order, restoring stock");
            self.restore_stock(&taken).await;
            return Err(e);
        }
        info!(shopper = %shopper, order_number = %order.order_number, total = %order.total_amount, "Checkout completed");

        if let Err(e) = self.sessions.terminate(&session, EndReason::Checkout).await {
            error!(shopper = %shopper, session_id = %session.id, error = %e, "Order recorded but session could not be ended");
        }
        match self.stores.tickets.mark_verified(shopper, now).await {
            Ok(true) => {}
            Ok(false) => warn!(shopper = %shopper, "Ticket was already verified"),
            Err(e) => error!(shopper = %shopper, error = %e, "Order recorded but ticket could not be marked verified"),
        }

        Ok(order)
    }

    /// Completed orders of the shopper, newest first.
    pub async fn order_history(&self, shopper: &ShopperId) -> Result<Vec<Order>> {
        self.stores.orders.for_shopper(shopper).await
    }

    async fn non_empty_session(&self, shopper: &ShopperId) -> Result<Session> {
        self.stores
            .sessions
            .active_for_shopper(shopper)
            .await?
            .filter(|session| !session.is_empty())
            .ok_or(CartError::EmptyCart)
    }

    async fn ensure_stock_covers(&self, items: &[LineItem]) -> Result<()> {
        for demand in demand_of(items) {
            let product = self
                .stores
                .catalog
                .get(&demand.product_id)
                .await?
                .ok_or_else(|| CartError::ProductNotFound(demand.name.clone()))?;
            product.ensure_covers(demand.quantity)?;
        }
        Ok(())
    }

    async fn take_stock(&self, items: &[LineItem]) -> Result<Vec<Demand>> {
        let mut taken = Vec::new();
        for demand in demand_of(items) {
            let failure = match self
                .stores
                .catalog
                .decrement_stock(&demand.product_id, demand.quantity)
                .await
            {
                Ok(StockAdjustment::Applied(remaining)) => {
                    debug!(product_id = %demand.product_id, remaining, "Stock decremented");
                    taken.push(demand);
                    continue;
                }
                Ok(StockAdjustment::Insufficient { available }) => {
                    warn!(product_id = %demand.product_id, available, requested = demand.quantity, "Stock taken by a concurrent checkout");
                    CartError::ConcurrentStockConflict(demand.name)
                }
                Ok(StockAdjustment::Missing) => CartError::ProductNotFound(demand.name),
                Err(e) => e,
            };
            self.restore_stock(&taken).await;
            return Err(failure);
        }
        Ok(taken)
    }

    async fn restore_stock(&self, taken: &[Demand]) {
        for demand in taken.iter().rev() {
            match self
                .stores
                .catalog
                .increment_stock(&demand.product_id, demand.quantity)
                .await
            {
                Ok(StockAdjustment::Applied(_)) => {}
                Ok(outcome) => {
                    error!(product_id = %demand.product_id, quantity = demand.quantity, ?outcome, "Could not restore stock");
                }
                Err(e) => {
                    error!(product_id = %demand.product_id, quantity = demand.quantity, error = %e, "Could not restore stock");
                }
            }
        }
    }
}

/// Sums quantities per product, keeping first-seen order.
fn demand_of(items: &[LineItem]) -> Vec<Demand> {
    let mut demand: Vec<Demand> = Vec::with_capacity(items.len());
    for item in items {
        match demand.iter_mut().find(|d| d.product_id == item.product_id) {
            Some(existing) => existing.quantity += item.quantity,
            None => demand.push(Demand {
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                quantity: item.quantity,
            }),
        }
    }
    demand
}
