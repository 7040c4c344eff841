use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::classification::{EnergyType, ParseEnumError, Submarket};
use crate::UserId;

/// Offer status
///
/// `Fresh` until the first purchase, `Open` while quantity remains,
/// `Fulfilled` once depleted, `Expired` once the period ends unsold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Fresh,
    Open,
    Fulfilled,
    Expired,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Fresh => "fresh",
            OfferStatus::Open => "open",
            OfferStatus::Fulfilled => "fulfilled",
            OfferStatus::Expired => "expired",
        }
    }

    /// No further purchases are accepted in a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OfferStatus::Fulfilled | OfferStatus::Expired)
    }
}

impl FromStr for OfferStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fresh" => Ok(OfferStatus::Fresh),
            "open" => Ok(OfferStatus::Open),
            "fulfilled" => Ok(OfferStatus::Fulfilled),
            "expired" => Ok(OfferStatus::Expired),
            other => Err(ParseEnumError {
                type_name: "offer status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supply window of an offer, both ends inclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// True once the whole last day of the period is in the past.
    pub fn has_elapsed(&self, today: NaiveDate) -> bool {
        today > self.end
    }

    pub fn overlaps(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
        from.map_or(true, |from| self.end >= from) && to.map_or(true, |to| self.start <= to)
    }
}

/// A seller's listing of energy at a fixed price per MWh
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: i64,
    pub uuid: Uuid,
    pub price_per_mwh: Decimal,
    pub initial_quantity_mwh: Decimal,
    pub remaining_quantity_mwh: Decimal,
    pub description: String,
    pub period: Period,
    pub status: OfferStatus,
    pub energy_type: EnergyType,
    pub submarket: Submarket,
    pub seller_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.seller_id == user
    }

    pub fn is_fresh(&self) -> bool {
        self.status == OfferStatus::Fresh
    }

    /// Whether trading on this offer is over, either by status or by calendar.
    pub fn has_ended(&self, today: NaiveDate) -> bool {
        self.status.is_terminal() || self.period.has_elapsed(today)
    }

    /// Quantity currently held by waiting or completed purchases
    pub fn reserved_quantity_mwh(&self) -> Decimal {
        self.initial_quantity_mwh - self.remaining_quantity_mwh
    }
}

/// Insert payload for a new offer; the store assigns the surrogate id.
#[derive(Debug, Clone)]
pub struct NewOffer {
    pub uuid: Uuid,
    pub price_per_mwh: Decimal,
    pub quantity_mwh: Decimal,
    pub description: String,
    pub period: Period,
    pub energy_type: EnergyType,
    pub submarket: Submarket,
    pub seller_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl NewOffer {
    /// Materialize the row as the store will hold it: fresh and untouched.
    pub fn into_offer(self, id: i64) -> Offer {
        Offer {
            id,
            uuid: self.uuid,
            price_per_mwh: self.price_per_mwh,
            initial_quantity_mwh: self.quantity_mwh,
            remaining_quantity_mwh: self.quantity_mwh,
            description: self.description,
            period: self.period,
            status: OfferStatus::Fresh,
            energy_type: self.energy_type,
            submarket: self.submarket,
            seller_id: self.seller_id,
            created_at: self.created_at,
        }
    }
}
