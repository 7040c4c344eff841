use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::classification::{ParseEnumError, PaymentMethod};
use crate::UserId;

/// Purchase status in the settlement lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Waiting,
    Completed,
    Canceled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Waiting => "waiting",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Canceled => "canceled",
        }
    }

    /// Waiting and completed purchases both hold quantity from their offer.
    pub fn holds_quantity(&self) -> bool {
        !matches!(self, PurchaseStatus::Canceled)
    }
}

impl FromStr for PurchaseStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(PurchaseStatus::Waiting),
            "completed" => Ok(PurchaseStatus::Completed),
            "canceled" => Ok(PurchaseStatus::Canceled),
            other => Err(ParseEnumError {
                type_name: "purchase status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A buyer's claim on part of an offer.
///
/// `offer_uuid` and `seller_id` are read through from the offer row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchase {
    pub id: i64,
    pub uuid: Uuid,
    pub quantity_mwh: Decimal,
    pub price_per_mwh: Decimal,
    pub status: PurchaseStatus,
    pub payment_method: PaymentMethod,
    pub buyer_id: UserId,
    pub offer_id: i64,
    pub offer_uuid: Uuid,
    pub seller_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Purchase {
    pub fn is_waiting(&self) -> bool {
        self.status == PurchaseStatus::Waiting
    }

    pub fn is_canceled(&self) -> bool {
        self.status == PurchaseStatus::Canceled
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.buyer_id == user
    }

    /// Buyer or seller of the underlying offer
    pub fn is_party(&self, user: UserId) -> bool {
        self.buyer_id == user || self.seller_id == user
    }

    pub fn total_price(&self) -> Decimal {
        (self.quantity_mwh * self.price_per_mwh).round_dp(2)
    }
}

/// Insert payload for a new purchase, written in `waiting` status.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub uuid: Uuid,
    pub quantity_mwh: Decimal,
    pub price_per_mwh: Decimal,
    pub payment_method: PaymentMethod,
    pub buyer_id: UserId,
    pub offer_id: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_price_rounds_to_cents() {
        let purchase = Purchase {
            id: 1,
            uuid: Uuid::new_v4(),
            quantity_mwh: Decimal::new(1_333, 3),
            price_per_mwh: Decimal::new(5_000, 2),
            status: PurchaseStatus::Waiting,
            payment_method: PaymentMethod::Pix,
            buyer_id: 7,
            offer_id: 1,
            offer_uuid: Uuid::new_v4(),
            seller_id: 3,
            created_at: Utc::now(),
        };

        assert_eq!(purchase.total_price(), Decimal::new(6_665, 2));
        assert!(purchase.is_party(7));
        assert!(purchase.is_party(3));
        assert!(!purchase.is_party(4));
    }

    #[test]
    fn test_canceled_holds_nothing() {
        assert!(PurchaseStatus::Waiting.holds_quantity());
        assert!(PurchaseStatus::Completed.holds_quantity());
        assert!(!PurchaseStatus::Canceled.holds_quantity());
    }
}
