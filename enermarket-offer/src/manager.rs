use chrono::NaiveDate;
use enermarket_core::{Clock, MarketError, MarketResult, MarketStore, PurchaseScope, StoreError};
use enermarket_shared::{
    NewOffer, Offer, OfferFilter, OfferStatus, Page, PageRequest, Participant, Period, Purchase,
    PurchaseFilter, PurchaseStatus, UserId,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::rules;

/// Seller-supplied fields of an offer, used both to create and to replace one
#[derive(Debug, Clone, Deserialize)]
pub struct OfferDraft {
    pub price_per_mwh: Decimal,
    pub quantity_mwh: Decimal,
    #[serde(default)]
    pub description: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub energy_type: String,
}

impl OfferDraft {
    fn period(&self) -> Period {
        Period::new(self.period_start, self.period_end)
    }
}

/// Offer Lifecycle Engine entry points
#[derive(Clone)]
pub struct OfferManager {
    store: Arc<dyn MarketStore>,
    clock: Arc<dyn Clock>,
}

impl OfferManager {
    pub fn new(store: Arc<dyn MarketStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create(&self, seller: &Participant, draft: OfferDraft) -> MarketResult<Offer> {
        rules::validate_price(draft.price_per_mwh)?;
        rules::validate_quantity(draft.quantity_mwh)?;
        let energy_type = rules::parse_energy_type(&draft.energy_type)?;
        let period = draft.period();
        rules::validate_new_period(&period, self.clock.today())?;

        let offer = self
            .store
            .insert_offer(&NewOffer {
                uuid: Uuid::new_v4(),
                price_per_mwh: draft.price_per_mwh,
                quantity_mwh: draft.quantity_mwh,
                description: draft.description,
                period,
                energy_type,
                submarket: seller.submarket,
                seller_id: seller.id,
                created_at: self.clock.now(),
            })
            .await?;

        info!(offer = %offer.uuid, seller = seller.id, quantity = %offer.initial_quantity_mwh, "offer created");
        Ok(offer)
    }

    /// Replace every seller-editable field; remaining quantity is reset to the new quantity.
    pub async fn update(&self, uuid: Uuid, seller: UserId, draft: OfferDraft) -> MarketResult<Offer> {
        let mut tx = self.store.begin().await?;
        let current = tx.lock_offer(uuid).await?.ok_or(MarketError::OfferNotFound)?;

        if !current.is_owned_by(seller) {
            return Err(MarketError::NotOfferOwner);
        }
        if !current.is_fresh() {
            return Err(MarketError::CannotUpdateOffer);
        }

        rules::validate_price(draft.price_per_mwh)?;
        rules::validate_quantity(draft.quantity_mwh)?;
        let energy_type = rules::parse_energy_type(&draft.energy_type)?;
        let period = draft.period();
        rules::validate_changed_period(&current.period, &period, self.clock.today())?;

        let updated = Offer {
            price_per_mwh: draft.price_per_mwh,
            initial_quantity_mwh: draft.quantity_mwh,
            remaining_quantity_mwh: draft.quantity_mwh,
            description: draft.description,
            period,
            energy_type,
            ..current
        };

        match tx.update_offer(&updated, OfferStatus::Fresh).await {
            Err(StoreError::Conflict(_)) => return Err(MarketError::CannotUpdateOffer),
            other => other?,
        }
        tx.commit().await?;

        info!(offer = %uuid, seller, "offer updated");
        Ok(updated)
    }

    pub async fn delete(&self, uuid: Uuid, seller: UserId) -> MarketResult<()> {
        let mut tx = self.store.begin().await?;
        let offer = tx.lock_offer(uuid).await?.ok_or(MarketError::OfferNotFound)?;

        if !offer.is_owned_by(seller) {
            return Err(MarketError::NotOfferOwner);
        }
        if !offer.is_fresh() {
            return Err(MarketError::CannotDeleteOffer);
        }

        match tx.delete_offer(offer.id, OfferStatus::Fresh).await {
            Err(StoreError::Conflict(_)) => return Err(MarketError::CannotDeleteOffer),
            other => other?,
        }
        tx.commit().await?;

        info!(offer = %uuid, seller, "offer deleted");
        Ok(())
    }

    pub async fn get(&self, uuid: Uuid) -> MarketResult<Offer> {
        self.store.find_offer(uuid).await?.ok_or(MarketError::OfferNotFound)
    }

    /// Tradable offers of other sellers
    pub async fn list(
        &self,
        filter: &OfferFilter,
        requester: UserId,
        page: PageRequest,
    ) -> MarketResult<Page<Offer>> {
        let rows = self.store.list_offers(filter, requester, &page).await?;
        Ok(Page::from_overfetch(&page, rows))
    }

    pub async fn list_for_seller(&self, seller: UserId) -> MarketResult<Vec<Offer>> {
        Ok(self.store.list_seller_offers(seller).await?)
    }

    /// Completed purchases against one of the seller's offers
    pub async fn purchases(
        &self,
        uuid: Uuid,
        seller: UserId,
        filter: PurchaseFilter,
        page: PageRequest,
    ) -> MarketResult<Page<Purchase>> {
        let offer = self.get(uuid).await?;
        if !offer.is_owned_by(seller) {
            return Err(MarketError::NotOfferOwner);
        }

        let filter = PurchaseFilter {
            status: Some(PurchaseStatus::Completed),
            ..filter
        };
        let rows = self
            .store
            .list_purchases(PurchaseScope::Offer(offer.id), &filter, &page)
            .await?;
        Ok(Page::from_overfetch(&page, rows))
    }

    /// Expire every tradable offer whose period is over. Safe to repeat.
    pub async fn sweep_expired(&self) -> MarketResult<u64> {
        let today = self.clock.today();
        let expired = self.store.expire_offers(today).await?;
        debug!(%today, expired, "expiry sweep finished");
        Ok(expired)
    }
}
