//! Quantity bookkeeping on an offer row that the caller has locked.
//!
//! Both functions mutate the offer in place; persisting it (with the prior
//! status as write predicate) is the caller's job, inside the same
//! transaction that wrote or canceled the purchase.

use chrono::NaiveDate;
use enermarket_core::{MarketError, MarketResult};
use enermarket_shared::{Offer, OfferStatus, UserId};
use rust_decimal::Decimal;

/// Take `quantity` out of the offer for `buyer`.
///
/// Checked in order: own offer, trading over, quantity available.
pub fn apply_reservation(
    offer: &mut Offer,
    buyer: UserId,
    quantity: Decimal,
    today: NaiveDate,
) -> MarketResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(MarketError::InvalidQuantity);
    }
    if offer.is_owned_by(buyer) {
        return Err(MarketError::CannotPurchaseOwnOffer);
    }
    if offer.has_ended(today) {
        return Err(MarketError::OfferHasEnded);
    }
    if quantity > offer.remaining_quantity_mwh {
        return Err(MarketError::InsufficientQuantity {
            requested: quantity,
            remaining: offer.remaining_quantity_mwh,
        });
    }

    offer.remaining_quantity_mwh -= quantity;
    offer.status = if offer.remaining_quantity_mwh.is_zero() {
        OfferStatus::Fulfilled
    } else {
        OfferStatus::Open
    };
    Ok(())
}

/// Give `quantity` back to the offer after a purchase is canceled.
///
/// A fulfilled offer reopens; an offer never goes back to `fresh`, and an
/// expired offer stays expired.
pub fn release_reservation(offer: &mut Offer, quantity: Decimal) -> MarketResult<()> {
    let restored = offer.remaining_quantity_mwh + quantity;
    if quantity <= Decimal::ZERO || restored > offer.initial_quantity_mwh {
        return Err(MarketError::Internal(format!(
            "releasing {} MWh would take offer {} past its initial {} MWh",
            quantity, offer.uuid, offer.initial_quantity_mwh
        )));
    }

    offer.remaining_quantity_mwh = restored;
    if offer.status == OfferStatus::Fulfilled {
        offer.status = OfferStatus::Open;
    }
    Ok(())
}
