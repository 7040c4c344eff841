use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::classification::{EnergyType, PaymentMethod, Submarket};
use super::offer::Offer;
use super::purchase::{Purchase, PurchaseStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Marketplace search criteria. The period bounds select offers whose
/// supply window overlaps `[period_start, period_end]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OfferFilter {
    pub submarket: Option<Submarket>,
    pub energy_type: Option<EnergyType>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
}

impl OfferFilter {
    pub fn matches(&self, offer: &Offer) -> bool {
        self.submarket.map_or(true, |s| offer.submarket == s)
            && self.energy_type.map_or(true, |t| offer.energy_type == t)
            && offer.period.overlaps(self.period_start, self.period_end)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PurchaseFilter {
    pub status: Option<PurchaseStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub order_price: Option<SortDirection>,
    pub order_quantity: Option<SortDirection>,
}

impl PurchaseFilter {
    pub fn matches(&self, purchase: &Purchase) -> bool {
        self.status.map_or(true, |s| purchase.status == s)
            && self.payment_method.map_or(true, |m| purchase.payment_method == m)
    }

    /// Price first, then quantity, then id ascending as the tie-breaker.
    pub fn compare(&self, a: &Purchase, b: &Purchase) -> Ordering {
        let by_price = self
            .order_price
            .map_or(Ordering::Equal, |d| d.apply(a.price_per_mwh.cmp(&b.price_per_mwh)));
        let by_quantity = self
            .order_quantity
            .map_or(Ordering::Equal, |d| d.apply(a.quantity_mwh.cmp(&b.quantity_mwh)));

        by_price.then(by_quantity).then(a.id.cmp(&b.id))
    }
}
