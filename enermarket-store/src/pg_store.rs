use async_trait::async_trait;
use chrono::NaiveDate;
use enermarket_core::{MarketStore, MarketTx, PurchaseScope, StoreError, StoreResult};
use enermarket_shared::{
    NewOffer, NewPurchase, Offer, OfferFilter, OfferStatus, PageRequest, Purchase, PurchaseFilter,
    PurchaseStatus, UserId,
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{offer_repo, purchase_repo};

/// Serialization failures and deadlocks abort the transaction; the caller may retry it whole.
pub(crate) fn db_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Database(Box::new(err))
}

#[derive(Clone)]
pub struct PgMarketStore {
    pool: PgPool,
}

impl PgMarketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarketStore for PgMarketStore {
    async fn begin(&self) -> StoreResult<Box<dyn MarketTx>> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgMarketTx { tx }))
    }

    async fn insert_offer(&self, offer: &NewOffer) -> StoreResult<Offer> {
        offer_repo::insert(&self.pool, offer).await
    }

    async fn find_offer(&self, uuid: Uuid) -> StoreResult<Option<Offer>> {
        offer_repo::find_by_uuid(&self.pool, uuid, false).await
    }

    async fn list_offers(
        &self,
        filter: &OfferFilter,
        exclude_seller: UserId,
        page: &PageRequest,
    ) -> StoreResult<Vec<Offer>> {
        offer_repo::list_tradable(&self.pool, filter, exclude_seller, page).await
    }

    async fn list_seller_offers(&self, seller: UserId) -> StoreResult<Vec<Offer>> {
        offer_repo::list_by_seller(&self.pool, seller).await
    }

    async fn find_purchase(&self, uuid: Uuid) -> StoreResult<Option<Purchase>> {
        purchase_repo::find_by_uuid(&self.pool, uuid, false).await
    }

    async fn list_purchases(
        &self,
        scope: PurchaseScope,
        filter: &PurchaseFilter,
        page: &PageRequest,
    ) -> StoreResult<Vec<Purchase>> {
        purchase_repo::list(&self.pool, scope, filter, page).await
    }

    async fn list_waiting_purchases(&self) -> StoreResult<Vec<Purchase>> {
        purchase_repo::list_waiting(&self.pool).await
    }

    async fn expire_offers(&self, today: NaiveDate) -> StoreResult<u64> {
        offer_repo::expire_elapsed(&self.pool, today).await
    }
}

pub struct PgMarketTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl MarketTx for PgMarketTx {
    async fn lock_offer(&mut self, uuid: Uuid) -> StoreResult<Option<Offer>> {
        offer_repo::find_by_uuid(&mut *self.tx, uuid, true).await
    }

    async fn lock_offer_by_id(&mut self, id: i64) -> StoreResult<Option<Offer>> {
        offer_repo::find_by_id(&mut *self.tx, id, true).await
    }

    async fn update_offer(&mut self, offer: &Offer, expected: OfferStatus) -> StoreResult<()> {
        offer_repo::update(&mut *self.tx, offer, expected).await
    }

    async fn delete_offer(&mut self, id: i64, expected: OfferStatus) -> StoreResult<()> {
        offer_repo::delete(&mut *self.tx, id, expected).await
    }

    async fn insert_purchase(&mut self, purchase: &NewPurchase) -> StoreResult<Purchase> {
        purchase_repo::insert(&mut *self.tx, purchase).await
    }

    async fn lock_purchase(&mut self, uuid: Uuid) -> StoreResult<Option<Purchase>> {
        purchase_repo::find_by_uuid(&mut *self.tx, uuid, true).await
    }

    async fn set_purchase_status(
        &mut self,
        id: i64,
        expected: PurchaseStatus,
        status: PurchaseStatus,
    ) -> StoreResult<()> {
        purchase_repo::set_status(&mut *self.tx, id, expected, status).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(db_err)
    }
}
