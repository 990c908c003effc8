use miette::Diagnostic;
use thiserror::Error;

/// Coarse classification of every failure a request can end with.
///
/// Callers (HTTP adapters, the CLI) branch on this instead of matching the
/// full [`CartError`] enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    Unauthorized,
    ExternalDependencyFailure,
    Internal,
}

#[derive(Error, Diagnostic, Debug)]
pub enum CartError {
    #[error("Cart not found or is currently in use: {0}")]
    #[diagnostic(code(cart::cart_unavailable), help("Scan a different cart barcode"))]
    CartUnavailable(String),

    #[error("Cart barcode already registered: {0}")]
    #[diagnostic(code(cart::duplicate_barcode))]
    DuplicateBarcode(String),

    #[error("No active shopping session")]
    #[diagnostic(code(cart::no_active_session), help("Start a session first"))]
    NoActiveSession,

    #[error("Product not found: {0}")]
    #[diagnostic(code(cart::product_not_found))]
    ProductNotFound(String),

    #[error("RFID tag already assigned to another product: {0}")]
    #[diagnostic(code(cart::duplicate_rfid_tag))]
    DuplicateRfidTag(String),

    #[error("Product {0} is out of stock")]
    #[diagnostic(code(cart::out_of_stock))]
    OutOfStock(String),

    #[error("Insufficient quantity for {product}. Available: {available}, requested: {requested}")]
    #[diagnostic(code(cart::insufficient_stock))]
    InsufficientStock {
        product: String,
        available: u32,
        requested: u32,
    },

    #[error("Stock for {0} changed while checking out")]
    #[diagnostic(code(cart::concurrent_stock_conflict), help("Retry the verification"))]
    ConcurrentStockConflict(String),

    #[error("Product not found in session: {0}")]
    #[diagnostic(code(cart::item_not_found))]
    ItemNotFound(String),

    #[error("Cart is empty")]
    #[diagnostic(code(cart::empty_cart))]
    EmptyCart,

    #[error("Invalid payment method: {0}")]
    #[diagnostic(
        code(cart::invalid_payment_method),
        help("Payment method must be either 'mobile_wallet' or 'visa'")
    )]
    InvalidPaymentMethod(String),

    #[error("Card number required for visa payment")]
    #[diagnostic(code(cart::missing_card_number))]
    MissingCardNumber,

    #[error("Malformed card number")]
    #[diagnostic(code(cart::invalid_card_number))]
    InvalidCardNumber,

    #[error("Missing required field: {0}")]
    #[diagnostic(code(cart::missing_field))]
    MissingField(&'static str),

    #[error("Validation error: {0}")]
    #[diagnostic(code(cart::validation))]
    ValidationError(String),

    #[error("OTP expired, not found, or already used")]
    #[diagnostic(code(cart::ticket_not_found), help("Initiate checkout again"))]
    TicketNotFound,

    #[error("Invalid OTP")]
    #[diagnostic(code(cart::invalid_code))]
    InvalidCode,

    #[error("Missing or invalid credential")]
    #[diagnostic(code(cart::unauthenticated))]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    #[diagnostic(code(cart::forbidden))]
    Forbidden(String),

    #[error("Failed to send OTP: {0}")]
    #[diagnostic(code(cart::notification_failed))]
    NotificationFailed(String),

    #[error("CSV error: {0}")]
    #[diagnostic(code(cart::csv))]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(cart::io))]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(cart::internal))]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl CartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CartError::NoActiveSession
            | CartError::ProductNotFound(_)
            | CartError::ItemNotFound(_)
            | CartError::TicketNotFound => ErrorKind::NotFound,
            CartError::CartUnavailable(_)
            | CartError::DuplicateBarcode(_)
            | CartError::DuplicateRfidTag(_)
            | CartError::OutOfStock(_)
            | CartError::InsufficientStock { .. }
            | CartError::ConcurrentStockConflict(_) => ErrorKind::Conflict,
            CartError::EmptyCart
            | CartError::InvalidPaymentMethod(_)
            | CartError::MissingCardNumber
            | CartError::InvalidCardNumber
            | CartError::MissingField(_)
            | CartError::ValidationError(_)
            | CartError::InvalidCode => ErrorKind::InvalidInput,
            CartError::Unauthenticated | CartError::Forbidden(_) => ErrorKind::Unauthorized,
            CartError::NotificationFailed(_) => ErrorKind::ExternalDependencyFailure,
            CartError::CsvError(_) | CartError::IoError(_) | CartError::InternalError(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        CartError::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}

impl From<serde_json::Error> for CartError {
    fn from(e: serde_json::Error) -> Self {
        CartError::InternalError(Box::new(e))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for CartError {
    fn from(e: rocksdb::Error) -> Self {
        CartError::InternalError(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, CartError>;
