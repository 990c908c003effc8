use super::ids::ShopperId;
use super::money::Money;
use super::session::LineItem;
use crate::error::CartError;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the shopper pays. Recorded on the order, never processed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    MobileWallet,
    Visa,
}

impl FromStr for PaymentMethod {
    type Err = CartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mobile_wallet" => Ok(PaymentMethod::MobileWallet),
            "visa" => Ok(PaymentMethod::Visa),
            other => Err(CartError::InvalidPaymentMethod(other.to_string())),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::MobileWallet => f.write_str("mobile_wallet"),
            PaymentMethod::Visa => f.write_str("visa"),
        }
    }
}

/// A card number reduced to its last four digits, e.g. `****1111`.
///
/// The only constructor takes the full number and masks it, so the full
/// number cannot end up in a ticket or an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaskedCard(String);

impl MaskedCard {
    pub fn from_card_number(card_number: &str) -> Result<Self, CartError> {
        let mut digits = String::with_capacity(card_number.len());
        for c in card_number.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' => {}
                _ => return Err(CartError::InvalidCardNumber),
            }
        }
        if digits.is_empty() {
            return Err(CartError::MissingCardNumber);
        }
        if digits.len() < 4 {
            return Err(CartError::InvalidCardNumber);
        }
        let last_four = &digits[digits.len() - 4..];
        Ok(Self(format!("****{last_four}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaskedCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payment details accepted at checkout initiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentDetails {
    pub method: PaymentMethod,
    pub card: Option<MaskedCard>,
}

impl PaymentDetails {
    /// Validates the raw method and card number. Visa needs a card; a card
    /// given with a wallet payment is ignored.
    pub fn parse(method: &str, card_number: Option<&str>) -> Result<Self, CartError> {
        let method: PaymentMethod = method.parse()?;
        let card = match method {
            PaymentMethod::Visa => {
                let number = card_number
                    .filter(|n| !n.trim().is_empty())
                    .ok_or(CartError::MissingCardNumber)?;
                Some(MaskedCard::from_card_number(number)?)
            }
            PaymentMethod::MobileWallet => None,
        };
        Ok(Self { method, card })
    }
}

/// Numeric one-time passcode.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OneTimeCode(String);

impl OneTimeCode {
    pub fn generate(digits: usize) -> Self {
        let mut rng = rand::thread_rng();
        let code = (0..digits)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        Self(code)
    }

    /// Compares in time independent of where the first mismatch is.
    /// Attempts are not counted; the ticket's expiry bounds them.
    pub fn matches(&self, submitted: &str) -> bool {
        let expected = self.0.as_bytes();
        let submitted = submitted.trim().as_bytes();
        if expected.len() != submitted.len() {
            return false;
        }
        expected
            .iter()
            .zip(submitted)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OneTimeCode {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for OneTimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OneTimeCode(******)")
    }
}

/// Timing and shape of the one-time passcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutPolicy {
    pub otp_ttl: Duration,
    pub code_digits: usize,
}

impl Default for CheckoutPolicy {
    fn default() -> Self {
        Self {
            otp_ttl: Duration::minutes(5),
            code_digits: 6,
        }
    }
}

/// The OTP-gated checkout intent of one shopper.
///
/// One per shopper: a new initiation replaces the previous ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutTicket {
    pub shopper: ShopperId,
    pub code: OneTimeCode,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub card: Option<MaskedCard>,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    /// Items and total frozen at initiation.
    pub items: Vec<LineItem>,
    pub total_amount: Money,
}

impl CheckoutTicket {
    pub fn issue(
        shopper: ShopperId,
        payment: PaymentDetails,
        items: Vec<LineItem>,
        total_amount: Money,
        policy: &CheckoutPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            shopper,
            code: OneTimeCode::generate(policy.code_digits),
            expires_at: now + policy.otp_ttl,
            created_at: now,
            payment_method: payment.method,
            card: payment.card,
            verified: false,
            verified_at: None,
            items,
            total_amount,
        }
    }

    /// A ticket can be verified only while unverified and unexpired.
    pub fn is_consumable(&self, now: DateTime<Utc>) -> bool {
        !self.verified && now < self.expires_at
    }
}
