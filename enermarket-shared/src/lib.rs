pub mod models;

pub use models::classification::{EnergyType, ParseEnumError, PaymentMethod, Submarket};
pub use models::filter::{OfferFilter, PurchaseFilter, SortDirection};
pub use models::offer::{NewOffer, Offer, OfferStatus, Period};
pub use models::page::{Page, PageError, PageRequest, MAX_PAGE_SIZE};
pub use models::purchase::{NewPurchase, Purchase, PurchaseStatus};

/// Identifier of a marketplace participant, owned by the user service.
pub type UserId = i64;

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Participant {
    pub id: UserId,
    pub submarket: Submarket,
}
