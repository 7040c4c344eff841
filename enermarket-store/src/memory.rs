use async_trait::async_trait;
use chrono::NaiveDate;
use enermarket_core::{MarketStore, MarketTx, PurchaseScope, StoreError, StoreResult};
use enermarket_shared::{
    NewOffer, NewPurchase, Offer, OfferFilter, OfferStatus, PageRequest, Purchase, PurchaseFilter,
    PurchaseStatus, UserId,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    offers: BTreeMap<i64, Offer>,
    purchases: BTreeMap<i64, Purchase>,
    next_offer_id: i64,
    next_purchase_id: i64,
}

impl MemoryState {
    fn offer_by_uuid(&self, uuid: Uuid) -> Option<&Offer> {
        self.offers.values().find(|o| o.uuid == uuid)
    }

    fn purchase_by_uuid(&self, uuid: Uuid) -> Option<&Purchase> {
        self.purchases.values().find(|p| p.uuid == uuid)
    }

    fn insert_offer(&mut self, new: &NewOffer) -> StoreResult<Offer> {
        if self.offer_by_uuid(new.uuid).is_some() {
            return Err(violation(format!("duplicate offer uuid {}", new.uuid)));
        }
        self.next_offer_id += 1;
        let offer = new.clone().into_offer(self.next_offer_id);
        self.offers.insert(offer.id, offer.clone());
        Ok(offer)
    }

    fn insert_purchase(&mut self, new: &NewPurchase) -> StoreResult<Purchase> {
        if self.purchase_by_uuid(new.uuid).is_some() {
            return Err(violation(format!("duplicate purchase uuid {}", new.uuid)));
        }
        let offer = self
            .offers
            .get(&new.offer_id)
            .ok_or_else(|| violation(format!("purchase references missing offer #{}", new.offer_id)))?;

        self.next_purchase_id += 1;
        let purchase = Purchase {
            id: self.next_purchase_id,
            uuid: new.uuid,
            quantity_mwh: new.quantity_mwh,
            price_per_mwh: new.price_per_mwh,
            status: PurchaseStatus::Waiting,
            payment_method: new.payment_method,
            buyer_id: new.buyer_id,
            offer_id: offer.id,
            offer_uuid: offer.uuid,
            seller_id: offer.seller_id,
            created_at: new.created_at,
        };
        self.purchases.insert(purchase.id, purchase.clone());
        Ok(purchase)
    }
}

fn violation(message: String) -> StoreError {
    StoreError::Database(message.into())
}

/// Decrement `counter` if it is positive; true when a fault should fire.
fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Debug, Default)]
struct Faults {
    commit_failures: AtomicU32,
    conflicts: AtomicU32,
}

/// In-process store with the same transactional contract as Postgres.
///
/// Transactions are serialized: `begin` holds the state lock until the
/// transaction commits or is dropped, and works on a staged copy so a
/// dropped transaction leaves no trace. Do not call store methods while
/// holding a transaction from the same task.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with a database error
    pub fn inject_commit_failures(&self, n: u32) {
        self.faults.commit_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` transactional offer writes report a conflict
    pub fn inject_conflicts(&self, n: u32) {
        self.faults.conflicts.store(n, Ordering::SeqCst);
    }

    pub async fn offers(&self) -> Vec<Offer> {
        self.state.lock().await.offers.values().cloned().collect()
    }

    pub async fn purchases(&self) -> Vec<Purchase> {
        self.state.lock().await.purchases.values().cloned().collect()
    }
}

fn window<T>(rows: impl Iterator<Item = T>, page: &PageRequest) -> Vec<T> {
    rows.skip(page.offset() as usize)
        .take(page.fetch_limit() as usize)
        .collect()
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn MarketTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            staged,
            faults: self.faults.clone(),
        }))
    }

    async fn insert_offer(&self, offer: &NewOffer) -> StoreResult<Offer> {
        self.state.lock().await.insert_offer(offer)
    }

    async fn find_offer(&self, uuid: Uuid) -> StoreResult<Option<Offer>> {
        Ok(self.state.lock().await.offer_by_uuid(uuid).cloned())
    }

    async fn list_offers(
        &self,
        filter: &OfferFilter,
        exclude_seller: UserId,
        page: &PageRequest,
    ) -> StoreResult<Vec<Offer>> {
        let state = self.state.lock().await;
        let rows = state.offers.values().filter(|o| {
            !o.status.is_terminal() && o.seller_id != exclude_seller && filter.matches(o)
        });
        Ok(window(rows.cloned(), page))
    }

    async fn list_seller_offers(&self, seller: UserId) -> StoreResult<Vec<Offer>> {
        let state = self.state.lock().await;
        Ok(state.offers.values().filter(|o| o.seller_id == seller).cloned().collect())
    }

    async fn find_purchase(&self, uuid: Uuid) -> StoreResult<Option<Purchase>> {
        Ok(self.state.lock().await.purchase_by_uuid(uuid).cloned())
    }

    async fn list_purchases(
        &self,
        scope: PurchaseScope,
        filter: &PurchaseFilter,
        page: &PageRequest,
    ) -> StoreResult<Vec<Purchase>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Purchase> = state
            .purchases
            .values()
            .filter(|p| match scope {
                PurchaseScope::Buyer(buyer) => p.buyer_id == buyer,
                PurchaseScope::Seller(seller) => p.seller_id == seller,
                PurchaseScope::Offer(offer_id) => p.offer_id == offer_id,
            })
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| filter.compare(a, b));

        Ok(window(rows.into_iter(), page))
    }

    async fn list_waiting_purchases(&self) -> StoreResult<Vec<Purchase>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Purchase> = state.purchases.values().filter(|p| p.is_waiting()).cloned().collect();
        rows.sort_by_key(|p| (p.created_at, p.id));
        Ok(rows)
    }

    async fn expire_offers(&self, today: NaiveDate) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let mut expired = 0;
        for offer in state.offers.values_mut() {
            if !offer.status.is_terminal() && offer.period.end < today {
                offer.status = OfferStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    faults: Arc<Faults>,
}

#[async_trait]
impl MarketTx for MemoryTx {
    async fn lock_offer(&mut self, uuid: Uuid) -> StoreResult<Option<Offer>> {
        Ok(self.staged.offer_by_uuid(uuid).cloned())
    }

    async fn lock_offer_by_id(&mut self, id: i64) -> StoreResult<Option<Offer>> {
        Ok(self.staged.offers.get(&id).cloned())
    }

    async fn update_offer(&mut self, offer: &Offer, expected: OfferStatus) -> StoreResult<()> {
        if take(&self.faults.conflicts) {
            return Err(StoreError::Conflict(format!("offer {} (injected)", offer.uuid)));
        }
        if offer.remaining_quantity_mwh.is_sign_negative()
            || offer.remaining_quantity_mwh > offer.initial_quantity_mwh
        {
            return Err(violation(format!("offer {} remaining quantity out of bounds", offer.uuid)));
        }

        match self.staged.offers.get_mut(&offer.id) {
            Some(stored) if stored.status == expected => {
                *stored = offer.clone();
                Ok(())
            }
            _ => Err(StoreError::Conflict(format!("offer {} is no longer {}", offer.uuid, expected))),
        }
    }

    async fn delete_offer(&mut self, id: i64, expected: OfferStatus) -> StoreResult<()> {
        match self.staged.offers.get(&id) {
            Some(stored) if stored.status == expected => {
                if self.staged.purchases.values().any(|p| p.offer_id == id) {
                    return Err(violation(format!("offer #{id} is still referenced by purchases")));
                }
                self.staged.offers.remove(&id);
                Ok(())
            }
            _ => Err(StoreError::Conflict(format!("offer #{id} is no longer {expected}"))),
        }
    }

    async fn insert_purchase(&mut self, purchase: &NewPurchase) -> StoreResult<Purchase> {
        self.staged.insert_purchase(purchase)
    }

    async fn lock_purchase(&mut self, uuid: Uuid) -> StoreResult<Option<Purchase>> {
        Ok(self.staged.purchase_by_uuid(uuid).cloned())
    }

    async fn set_purchase_status(
        &mut self,
        id: i64,
        expected: PurchaseStatus,
        status: PurchaseStatus,
    ) -> StoreResult<()> {
        match self.staged.purchases.get_mut(&id) {
            Some(stored) if stored.status == expected => {
                stored.status = status;
                Ok(())
            }
            _ => Err(StoreError::Conflict(format!("purchase #{id} is no longer {expected}"))),
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, staged, faults } = *self;
        if take(&faults.commit_failures) {
            return Err(violation("injected commit failure".to_string()));
        }
        *guard = staged;
        Ok(())
    }
}
