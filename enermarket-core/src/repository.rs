use async_trait::async_trait;
use chrono::NaiveDate;
use enermarket_shared::{
    NewOffer, NewPurchase, Offer, OfferFilter, OfferStatus, PageRequest, Purchase, PurchaseFilter,
    PurchaseStatus, UserId,
};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A conditional write lost a race or the database aborted the
    /// transaction to keep it serializable. The whole transaction may be retried.
    #[error("concurrent write conflict on {0}")]
    Conflict(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Which purchases a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseScope {
    /// Purchases made by this buyer
    Buyer(UserId),
    /// Purchases made against any offer of this seller
    Seller(UserId),
    /// Purchases made against one offer, by surrogate id
    Offer(i64),
}

/// Transactional relational store holding offers and purchases.
///
/// Listing methods return up to `page.fetch_limit()` rows starting at
/// `page.offset()`; callers build the [`enermarket_shared::Page`].
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Open a transaction. Dropping it without `commit` rolls back.
    async fn begin(&self) -> StoreResult<Box<dyn MarketTx>>;

    async fn insert_offer(&self, offer: &NewOffer) -> StoreResult<Offer>;

    async fn find_offer(&self, uuid: Uuid) -> StoreResult<Option<Offer>>;

    /// Offers still open for trading (`fresh`/`open`) matching `filter`,
    /// excluding those sold by `exclude_seller`. Ordered by id.
    async fn list_offers(
        &self,
        filter: &OfferFilter,
        exclude_seller: UserId,
        page: &PageRequest,
    ) -> StoreResult<Vec<Offer>>;

    async fn list_seller_offers(&self, seller: UserId) -> StoreResult<Vec<Offer>>;

    async fn find_purchase(&self, uuid: Uuid) -> StoreResult<Option<Purchase>>;

    async fn list_purchases(
        &self,
        scope: PurchaseScope,
        filter: &PurchaseFilter,
        page: &PageRequest,
    ) -> StoreResult<Vec<Purchase>>;

    /// Every purchase still awaiting settlement, oldest first
    async fn list_waiting_purchases(&self) -> StoreResult<Vec<Purchase>>;

    /// Move every `fresh` or `open` offer whose period ended before `today`
    /// to `expired`. Returns the number of offers changed.
    async fn expire_offers(&self, today: NaiveDate) -> StoreResult<u64>;
}

/// Operations that run inside one store transaction.
///
/// Status-changing writes carry the status the caller read; the write fails
/// with [`StoreError::Conflict`] if the row no longer has it.
#[async_trait]
pub trait MarketTx: Send {
    /// Read an offer and hold its row lock until the transaction ends
    async fn lock_offer(&mut self, uuid: Uuid) -> StoreResult<Option<Offer>>;

    async fn lock_offer_by_id(&mut self, id: i64) -> StoreResult<Option<Offer>>;

    async fn update_offer(&mut self, offer: &Offer, expected: OfferStatus) -> StoreResult<()>;

    async fn delete_offer(&mut self, id: i64, expected: OfferStatus) -> StoreResult<()>;

    async fn insert_purchase(&mut self, purchase: &NewPurchase) -> StoreResult<Purchase>;

    /// Read a purchase and hold its row lock until the transaction ends
    async fn lock_purchase(&mut self, uuid: Uuid) -> StoreResult<Option<Purchase>>;

    async fn set_purchase_status(
        &mut self,
        id: i64,
        expected: PurchaseStatus,
        status: PurchaseStatus,
    ) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
