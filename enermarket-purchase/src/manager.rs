use chrono::{DateTime, Utc};
use enermarket_core::{Clock, MarketError, MarketResult, MarketStore, PurchaseScope, StoreError};
use enermarket_offer::{apply_reservation, release_reservation, rules};
use enermarket_shared::{
    NewPurchase, Page, PageRequest, Participant, PaymentMethod, Purchase, PurchaseFilter,
    PurchaseStatus, UserId,
};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::settlement::SettlementQueue;

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    pub quantity_mwh: Decimal,
    pub payment_method: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PurchasePolicy {
    /// How long after creation a buyer may still cancel
    pub cancel_window: chrono::Duration,
    /// Extra attempts after a write conflict before giving up
    pub max_conflict_retries: u32,
}

impl Default for PurchasePolicy {
    fn default() -> Self {
        Self {
            cancel_window: chrono::Duration::hours(2),
            max_conflict_retries: 3,
        }
    }
}

/// Who is asking for a cancellation
#[derive(Debug, Clone, Copy)]
pub enum CancelOrigin {
    /// The buyer; ownership and the cancellation window apply
    Requester {
        user: UserId,
        now: DateTime<Utc>,
        window: chrono::Duration,
    },
    /// Settlement compensating a failed payment; only waiting purchases are touched
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    Canceled(Purchase),
    /// Left as found; only reported for system cancellations
    Unchanged(PurchaseStatus),
}

/// Cancel a purchase and hand its quantity back to the offer, in one transaction.
pub async fn cancel_purchase(
    store: &dyn MarketStore,
    uuid: Uuid,
    origin: CancelOrigin,
) -> MarketResult<CancelOutcome> {
    let mut tx = store.begin().await?;
    let purchase = tx.lock_purchase(uuid).await?.ok_or(MarketError::PurchaseNotFound)?;

    match origin {
        CancelOrigin::Requester { user, now, window } => {
            if !purchase.is_owned_by(user) {
                return Err(MarketError::NotPurchaseOwner);
            }
            if purchase.is_canceled() || now > purchase.created_at + window {
                return Err(MarketError::PurchaseNotCancelable);
            }
        }
        CancelOrigin::System => {
            if !purchase.is_waiting() {
                return Ok(CancelOutcome::Unchanged(purchase.status));
            }
        }
    }

    let mut offer = tx
        .lock_offer_by_id(purchase.offer_id)
        .await?
        .ok_or_else(|| MarketError::Internal(format!("purchase {} has no offer", purchase.uuid)))?;
    let offer_status = offer.status;
    release_reservation(&mut offer, purchase.quantity_mwh)?;

    tx.set_purchase_status(purchase.id, purchase.status, PurchaseStatus::Canceled).await?;
    tx.update_offer(&offer, offer_status).await?;
    tx.commit().await?;

    info!(
        purchase = %uuid,
        offer = %offer.uuid,
        quantity = %purchase.quantity_mwh,
        remaining = %offer.remaining_quantity_mwh,
        "purchase canceled"
    );
    Ok(CancelOutcome::Canceled(Purchase {
        status: PurchaseStatus::Canceled,
        ..purchase
    }))
}

/// Failure of one reservation attempt, keeping write conflicts apart so they can be retried
enum AttemptError {
    Market(MarketError),
    Store(StoreError),
}

impl From<MarketError> for AttemptError {
    fn from(err: MarketError) -> Self {
        AttemptError::Market(err)
    }
}

impl From<StoreError> for AttemptError {
    fn from(err: StoreError) -> Self {
        AttemptError::Store(err)
    }
}

/// Purchase Lifecycle Engine entry points
#[derive(Clone)]
pub struct PurchaseManager {
    store: Arc<dyn MarketStore>,
    clock: Arc<dyn Clock>,
    settlement: SettlementQueue,
    policy: PurchasePolicy,
}

impl PurchaseManager {
    pub fn new(
        store: Arc<dyn MarketStore>,
        clock: Arc<dyn Clock>,
        settlement: SettlementQueue,
        policy: PurchasePolicy,
    ) -> Self {
        Self {
            store,
            clock,
            settlement,
            policy,
        }
    }

    /// Reserve quantity on an offer and record a waiting purchase, then queue its settlement.
    pub async fn create(
        &self,
        buyer: &Participant,
        offer_uuid: Uuid,
        request: PurchaseRequest,
    ) -> MarketResult<Purchase> {
        rules::validate_quantity(request.quantity_mwh)?;
        let method = rules::parse_payment_method(&request.payment_method)?;

        let mut attempt = 0;
        let purchase = loop {
            match self.reserve(buyer.id, offer_uuid, request.quantity_mwh, method).await {
                Ok(purchase) => break purchase,
                Err(AttemptError::Market(err)) => return Err(err),
                Err(AttemptError::Store(err)) if err.is_conflict() => {
                    if attempt >= self.policy.max_conflict_retries {
                        return Err(MarketError::Internal(format!(
                            "offer {offer_uuid} still contended after {} attempts: {err}",
                            attempt + 1
                        )));
                    }
                    attempt += 1;
                    let jitter = rand::thread_rng().gen_range(0..=10u64);
                    warn!(offer = %offer_uuid, attempt, "purchase hit a write conflict, retrying");
                    tokio::time::sleep(Duration::from_millis(5 * u64::from(attempt) + jitter)).await;
                }
                Err(AttemptError::Store(err)) => return Err(err.into()),
            }
        };

        info!(
            purchase = %purchase.uuid,
            offer = %offer_uuid,
            buyer = buyer.id,
            quantity = %purchase.quantity_mwh,
            method = %purchase.payment_method,
            "purchase reserved"
        );

        if !self.settlement.schedule(&purchase) {
            // The row stays waiting and is picked up again when settlement restarts.
            warn!(purchase = %purchase.uuid, "settlement worker is not running");
        }
        Ok(purchase)
    }

    async fn reserve(
        &self,
        buyer: UserId,
        offer_uuid: Uuid,
        quantity: Decimal,
        method: PaymentMethod,
    ) -> Result<Purchase, AttemptError> {
        let mut tx = self.store.begin().await?;
        let mut offer = tx.lock_offer(offer_uuid).await?.ok_or(MarketError::OfferNotFound)?;
        let offer_status = offer.status;

        apply_reservation(&mut offer, buyer, quantity, self.clock.today())?;
        tx.update_offer(&offer, offer_status).await?;

        let purchase = tx
            .insert_purchase(&NewPurchase {
                uuid: Uuid::new_v4(),
                quantity_mwh: quantity,
                price_per_mwh: offer.price_per_mwh,
                payment_method: method,
                buyer_id: buyer,
                offer_id: offer.id,
                created_at: self.clock.now(),
            })
            .await?;
        tx.commit().await?;

        Ok(purchase)
    }

    /// Buyer-initiated cancellation within the window
    pub async fn cancel(&self, uuid: Uuid, requester: UserId) -> MarketResult<Purchase> {
        let origin = CancelOrigin::Requester {
            user: requester,
            now: self.clock.now(),
            window: self.policy.cancel_window,
        };
        match cancel_purchase(self.store.as_ref(), uuid, origin).await? {
            CancelOutcome::Canceled(purchase) => Ok(purchase),
            CancelOutcome::Unchanged(_) => Err(MarketError::PurchaseNotCancelable),
        }
    }

    /// Visible to the buyer and to the seller of the offer
    pub async fn find(&self, uuid: Uuid, requester: UserId) -> MarketResult<Purchase> {
        let purchase = self
            .store
            .find_purchase(uuid)
            .await?
            .ok_or(MarketError::PurchaseNotFound)?;

        if !purchase.is_party(requester) {
            return Err(MarketError::NotPurchaseOwner);
        }
        Ok(purchase)
    }

    pub async fn list(
        &self,
        buyer: UserId,
        filter: &PurchaseFilter,
        page: PageRequest,
    ) -> MarketResult<Page<Purchase>> {
        let rows = self.store.list_purchases(PurchaseScope::Buyer(buyer), filter, &page).await?;
        Ok(Page::from_overfetch(&page, rows))
    }

    pub async fn list_sales(
        &self,
        seller: UserId,
        filter: &PurchaseFilter,
        page: PageRequest,
    ) -> MarketResult<Page<Purchase>> {
        let rows = self.store.list_purchases(PurchaseScope::Seller(seller), filter, &page).await?;
        Ok(Page::from_overfetch(&page, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::SettlementDelays;
    use chrono::{Offset, TimeZone};
    use enermarket_core::{ErrorKind, ManualClock};
    use enermarket_offer::{OfferDraft, OfferManager};
    use enermarket_shared::{Offer, OfferStatus, Submarket};
    use enermarket_store::MemoryStore;

    const SELLER: Participant = Participant { id: 10, submarket: Submarket::South };
    const BUYER: Participant = Participant { id: 20, submarket: Submarket::North };

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        offers: OfferManager,
        purchases: PurchaseManager,
        jobs: tokio::sync::mpsc::UnboundedReceiver<crate::settlement::SettlementJob>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 11, 2, 9, 0, 0).unwrap(),
            Utc.fix(),
        ));
        let (queue, jobs) = SettlementQueue::new(SettlementDelays::default());
        Fixture {
            offers: OfferManager::new(store.clone(), clock.clone()),
            purchases: PurchaseManager::new(store.clone(), clock.clone(), queue, PurchasePolicy::default()),
            store,
            clock,
            jobs,
        }
    }

    async fn offer(f: &Fixture, quantity: i64) -> Offer {
        let today = f.clock.today();
        f.offers
            .create(
                &SELLER,
                OfferDraft {
                    price_per_mwh: Decimal::from(50),
                    quantity_mwh: Decimal::from(quantity),
                    description: String::new(),
                    period_start: today,
                    period_end: today + chrono::Duration::days(10),
                    energy_type: "solar".into(),
                },
            )
            .await
            .unwrap()
    }

    fn request(quantity: i64, method: &str) -> PurchaseRequest {
        PurchaseRequest {
            quantity_mwh: Decimal::from(quantity),
            payment_method: method.into(),
        }
    }

    #[tokio::test]
    async fn test_create_copies_price_and_queues_settlement() {
        let mut f = fixture();
        let o = offer(&f, 100).await;

        let purchase = f.purchases.create(&BUYER, o.uuid, request(40, "card")).await.unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Waiting);
        assert_eq!(purchase.price_per_mwh, Decimal::from(50));
        assert_eq!(purchase.seller_id, SELLER.id);

        let job = f.jobs.try_recv().unwrap();
        assert_eq!(job.purchase_uuid, purchase.uuid);
        assert_eq!(job.due_at, purchase.created_at + chrono::Duration::minutes(5));

        let stored = f.offers.get(o.uuid).await.unwrap();
        assert_eq!(stored.remaining_quantity_mwh, Decimal::from(60));
        assert_eq!(stored.status, OfferStatus::Open);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let f = fixture();
        let o = offer(&f, 100).await;

        let err = f.purchases.create(&BUYER, o.uuid, request(0, "pix")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuantity);

        let err = f.purchases.create(&BUYER, o.uuid, request(1, "barter")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPaymentMethod);

        let err = f.purchases.create(&BUYER, Uuid::new_v4(), request(1, "pix")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OfferNotFound);

        let err = f.purchases.create(&SELLER, o.uuid, request(1, "pix")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CannotPurchaseOwnOffer);
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_then_surface_as_internal() {
        let f = fixture();
        let o = offer(&f, 100).await;

        f.store.inject_conflicts(2);
        f.purchases.create(&BUYER, o.uuid, request(10, "pix")).await.unwrap();

        f.store.inject_conflicts(10);
        let err = f.purchases.create(&BUYER, o.uuid, request(10, "pix")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        f.store.inject_conflicts(0);

        assert_eq!(f.offers.get(o.uuid).await.unwrap().remaining_quantity_mwh, Decimal::from(90));
    }

    #[tokio::test]
    async fn test_failed_commit_writes_nothing() {
        let f = fixture();
        let o = offer(&f, 100).await;

        f.store.inject_commit_failures(1);
        let err = f.purchases.create(&BUYER, o.uuid, request(10, "pix")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        assert!(f.store.purchases().await.is_empty());
        let stored = f.offers.get(o.uuid).await.unwrap();
        assert_eq!(stored.remaining_quantity_mwh, Decimal::from(100));
        assert_eq!(stored.status, OfferStatus::Fresh);
    }

    #[tokio::test]
    async fn test_cancel_window_is_two_hours() {
        let f = fixture();
        let o = offer(&f, 100).await;

        let early = f.purchases.create(&BUYER, o.uuid, request(10, "pix")).await.unwrap();
        let late = f.purchases.create(&BUYER, o.uuid, request(10, "pix")).await.unwrap();

        f.clock.advance(chrono::Duration::minutes(119));
        f.purchases.cancel(early.uuid, BUYER.id).await.unwrap();

        f.clock.advance(chrono::Duration::minutes(2));
        let err = f.purchases.cancel(late.uuid, BUYER.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PurchaseNotCancelable);

        assert_eq!(f.offers.get(o.uuid).await.unwrap().remaining_quantity_mwh, Decimal::from(90));
    }

    #[tokio::test]
    async fn test_cancel_checks_owner_and_state() {
        let f = fixture();
        let o = offer(&f, 100).await;
        let purchase = f.purchases.create(&BUYER, o.uuid, request(10, "pix")).await.unwrap();

        let err = f.purchases.cancel(purchase.uuid, SELLER.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPurchaseOwner);

        let canceled = f.purchases.cancel(purchase.uuid, BUYER.id).await.unwrap();
        assert_eq!(canceled.status, PurchaseStatus::Canceled);

        let err = f.purchases.cancel(purchase.uuid, BUYER.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PurchaseNotCancelable);

        let err = f.purchases.cancel(Uuid::new_v4(), BUYER.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PurchaseNotFound);
    }

    #[tokio::test]
    async fn test_system_cancel_leaves_settled_purchases_alone() {
        let f = fixture();
        let o = offer(&f, 100).await;
        let purchase = f.purchases.create(&BUYER, o.uuid, request(10, "pix")).await.unwrap();

        f.purchases.cancel(purchase.uuid, BUYER.id).await.unwrap();
        let outcome = cancel_purchase(f.store.as_ref(), purchase.uuid, CancelOrigin::System).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Unchanged(PurchaseStatus::Canceled));

        // quantity was given back exactly once
        assert_eq!(f.offers.get(o.uuid).await.unwrap().remaining_quantity_mwh, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_find_and_lists_respect_parties() {
        let f = fixture();
        let o = offer(&f, 100).await;
        let purchase = f.purchases.create(&BUYER, o.uuid, request(10, "billet")).await.unwrap();

        assert_eq!(f.purchases.find(purchase.uuid, BUYER.id).await.unwrap(), purchase);
        assert_eq!(f.purchases.find(purchase.uuid, SELLER.id).await.unwrap(), purchase);
        let err = f.purchases.find(purchase.uuid, 999).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPurchaseOwner);

        let page = PageRequest::new(1, 10).unwrap();
        let mine = f.purchases.list(BUYER.id, &PurchaseFilter::default(), page).await.unwrap();
        assert_eq!(mine.data, vec![purchase.clone()]);
        let sales = f.purchases.list_sales(SELLER.id, &PurchaseFilter::default(), page).await.unwrap();
        assert_eq!(sales.data, vec![purchase]);
        let nothing = f.purchases.list_sales(BUYER.id, &PurchaseFilter::default(), page).await.unwrap();
        assert!(nothing.data.is_empty());
    }
}
