pub mod clock;
pub mod payment;
pub mod repository;

use enermarket_shared::PageError;
use rust_decimal::Decimal;
use serde::Serialize;

pub use clock::{Clock, ManualClock, SystemClock};
pub use payment::{PaymentAdapter, PaymentStatus};
pub use repository::{MarketStore, MarketTx, PurchaseScope, StoreError, StoreResult};

/// Broad class of a failure, used by boundary layers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input; resubmitting unchanged fails again
    Validation,
    /// Input is well formed but the current state forbids the operation
    BusinessRule,
    NotFound,
    Internal,
}

/// Stable, machine-readable identity of a [`MarketError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidPrice,
    InvalidQuantity,
    InvalidPeriod,
    InvalidEnergyType,
    InvalidPaymentMethod,
    InvalidPagination,
    OfferNotFound,
    PurchaseNotFound,
    NotOfferOwner,
    NotPurchaseOwner,
    CannotUpdateOffer,
    CannotDeleteOffer,
    InsufficientQuantity,
    OfferHasEnded,
    CannotPurchaseOwnOffer,
    PurchaseNotCancelable,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidPrice => "INVALID_PRICE",
            ErrorKind::InvalidQuantity => "INVALID_QUANTITY",
            ErrorKind::InvalidPeriod => "INVALID_PERIOD",
            ErrorKind::InvalidEnergyType => "INVALID_ENERGY_TYPE",
            ErrorKind::InvalidPaymentMethod => "INVALID_PAYMENT_METHOD",
            ErrorKind::InvalidPagination => "INVALID_PAGINATION",
            ErrorKind::OfferNotFound => "OFFER_NOT_FOUND",
            ErrorKind::PurchaseNotFound => "PURCHASE_NOT_FOUND",
            ErrorKind::NotOfferOwner => "NOT_OFFER_OWNER",
            ErrorKind::NotPurchaseOwner => "NOT_PURCHASE_OWNER",
            ErrorKind::CannotUpdateOffer => "CANNOT_UPDATE_OFFER",
            ErrorKind::CannotDeleteOffer => "CANNOT_DELETE_OFFER",
            ErrorKind::InsufficientQuantity => "INSUFFICIENT_QUANTITY",
            ErrorKind::OfferHasEnded => "OFFER_HAS_ENDED",
            ErrorKind::CannotPurchaseOwnOffer => "CANNOT_PURCHASE_OWN_OFFER",
            ErrorKind::PurchaseNotCancelable => "PURCHASE_NOT_CANCELABLE",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::InvalidPrice
            | ErrorKind::InvalidQuantity
            | ErrorKind::InvalidPeriod
            | ErrorKind::InvalidEnergyType
            | ErrorKind::InvalidPaymentMethod
            | ErrorKind::InvalidPagination => ErrorCategory::Validation,
            ErrorKind::OfferNotFound | ErrorKind::PurchaseNotFound => ErrorCategory::NotFound,
            ErrorKind::NotOfferOwner
            | ErrorKind::NotPurchaseOwner
            | ErrorKind::CannotPurchaseOwnOffer
            | ErrorKind::CannotUpdateOffer
            | ErrorKind::CannotDeleteOffer
            | ErrorKind::InsufficientQuantity
            | ErrorKind::OfferHasEnded
            | ErrorKind::PurchaseNotCancelable => ErrorCategory::BusinessRule,
            ErrorKind::Internal => ErrorCategory::Internal,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("price per MWh must be positive with at most 2 decimal places")]
    InvalidPrice,
    #[error("quantity must be positive with at most 3 decimal places")]
    InvalidQuantity,
    #[error("invalid period")]
    InvalidPeriod,
    #[error("invalid energy type: {0}")]
    InvalidEnergyType(String),
    #[error("invalid payment method: {0}")]
    InvalidPaymentMethod(String),
    #[error(transparent)]
    InvalidPagination(#[from] PageError),
    #[error("offer not found")]
    OfferNotFound,
    #[error("purchase not found")]
    PurchaseNotFound,
    #[error("user is not the offer owner")]
    NotOfferOwner,
    #[error("user is not the purchase owner")]
    NotPurchaseOwner,
    #[error("offer can only be updated before its first purchase")]
    CannotUpdateOffer,
    #[error("offer can only be deleted before its first purchase")]
    CannotDeleteOffer,
    #[error("insufficient offer quantity: requested {requested} MWh, remaining {remaining} MWh")]
    InsufficientQuantity { requested: Decimal, remaining: Decimal },
    #[error("offer has ended")]
    OfferHasEnded,
    #[error("cannot purchase own offer")]
    CannotPurchaseOwnOffer,
    #[error("purchase cannot be canceled")]
    PurchaseNotCancelable,
    #[error("unexpected internal error: {0}")]
    Internal(String),
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::InvalidPrice => ErrorKind::InvalidPrice,
            MarketError::InvalidQuantity => ErrorKind::InvalidQuantity,
            MarketError::InvalidPeriod => ErrorKind::InvalidPeriod,
            MarketError::InvalidEnergyType(_) => ErrorKind::InvalidEnergyType,
            MarketError::InvalidPaymentMethod(_) => ErrorKind::InvalidPaymentMethod,
            MarketError::InvalidPagination(_) => ErrorKind::InvalidPagination,
            MarketError::OfferNotFound => ErrorKind::OfferNotFound,
            MarketError::PurchaseNotFound => ErrorKind::PurchaseNotFound,
            MarketError::NotOfferOwner => ErrorKind::NotOfferOwner,
            MarketError::NotPurchaseOwner => ErrorKind::NotPurchaseOwner,
            MarketError::CannotUpdateOffer => ErrorKind::CannotUpdateOffer,
            MarketError::CannotDeleteOffer => ErrorKind::CannotDeleteOffer,
            MarketError::InsufficientQuantity { .. } => ErrorKind::InsufficientQuantity,
            MarketError::OfferHasEnded => ErrorKind::OfferHasEnded,
            MarketError::CannotPurchaseOwnOffer => ErrorKind::CannotPurchaseOwnOffer,
            MarketError::PurchaseNotCancelable => ErrorKind::PurchaseNotCancelable,
            MarketError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for MarketError {
    fn from(err: StoreError) -> Self {
        MarketError::Internal(err.to_string())
    }
}

pub type MarketResult<T> = Result<T, MarketError>;
