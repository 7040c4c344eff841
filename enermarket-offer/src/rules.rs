use chrono::NaiveDate;
use enermarket_core::{MarketError, MarketResult};
use enermarket_shared::{EnergyType, PaymentMethod, Period};
use rust_decimal::Decimal;

pub const QUANTITY_SCALE: u32 = 3;
pub const PRICE_SCALE: u32 = 2;

/// Largest quantity a NUMERIC(10,3) column holds
pub fn max_quantity() -> Decimal {
    Decimal::new(9_999_999_999, QUANTITY_SCALE)
}

/// Largest price a NUMERIC(10,2) column holds
pub fn max_price() -> Decimal {
    Decimal::new(9_999_999_999, PRICE_SCALE)
}

fn fits(value: Decimal, scale: u32, max: Decimal) -> bool {
    value > Decimal::ZERO && value.normalize().scale() <= scale && value <= max
}

pub fn validate_price(price: Decimal) -> MarketResult<()> {
    if fits(price, PRICE_SCALE, max_price()) {
        Ok(())
    } else {
        Err(MarketError::InvalidPrice)
    }
}

pub fn validate_quantity(quantity: Decimal) -> MarketResult<()> {
    if fits(quantity, QUANTITY_SCALE, max_quantity()) {
        Ok(())
    } else {
        Err(MarketError::InvalidQuantity)
    }
}

/// A new offer's window must be ordered and must not start in the past.
pub fn validate_new_period(period: &Period, today: NaiveDate) -> MarketResult<()> {
    if period.start > period.end || period.start < today {
        return Err(MarketError::InvalidPeriod);
    }
    Ok(())
}

/// Only the bounds that actually change are held against `today`, so an
/// offer whose window has already begun can still be edited.
pub fn validate_changed_period(current: &Period, next: &Period, today: NaiveDate) -> MarketResult<()> {
    if next.start != current.start && (next.start > next.end || next.start < today) {
        return Err(MarketError::InvalidPeriod);
    }
    if next.end != current.end && (next.end < next.start || next.end < today) {
        return Err(MarketError::InvalidPeriod);
    }
    Ok(())
}

pub fn parse_energy_type(name: &str) -> MarketResult<EnergyType> {
    name.parse()
        .map_err(|_| MarketError::InvalidEnergyType(name.to_string()))
}

pub fn parse_payment_method(name: &str) -> MarketResult<PaymentMethod> {
    name.parse()
        .map_err(|_| MarketError::InvalidPaymentMethod(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use enermarket_core::ErrorKind;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 11, d).unwrap()
    }

    #[test]
    fn test_price_scale_and_bounds() {
        assert!(validate_price(Decimal::new(5050, 2)).is_ok());
        // trailing zeros do not count against the scale
        assert!(validate_price(Decimal::new(50500, 3)).is_ok());
        assert!(validate_price(Decimal::new(50505, 3)).is_err());
        assert!(validate_price(Decimal::ZERO).is_err());
        assert!(validate_price(Decimal::new(-1, 0)).is_err());
        assert!(validate_price(max_price()).is_ok());
        assert!(validate_price(max_price() + Decimal::new(1, 2)).is_err());
    }

    #[test]
    fn test_quantity_scale_and_bounds() {
        assert!(validate_quantity(Decimal::new(1, 3)).is_ok());
        assert!(validate_quantity(Decimal::new(1, 4)).is_err());
        assert!(validate_quantity(max_quantity()).is_ok());
        let err = validate_quantity(Decimal::new(-5, 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuantity);
    }

    #[test]
    fn test_new_period_must_start_today_or_later() {
        assert!(validate_new_period(&Period::new(day(10), day(10)), day(10)).is_ok());
        assert!(validate_new_period(&Period::new(day(9), day(12)), day(10)).is_err());
        assert!(validate_new_period(&Period::new(day(12), day(11)), day(10)).is_err());
    }

    #[test]
    fn test_changed_period_exempts_unchanged_bounds() {
        let current = Period::new(day(5), day(20));

        // window already begun, only the end moves
        assert!(validate_changed_period(&current, &Period::new(day(5), day(25)), day(10)).is_ok());
        // moving the start into the past is rejected
        assert!(validate_changed_period(&current, &Period::new(day(6), day(20)), day(10)).is_err());
        // moving the end into the past is rejected
        assert!(validate_changed_period(&current, &Period::new(day(5), day(9)), day(10)).is_err());
        // nothing changed, nothing checked
        assert!(validate_changed_period(&current, &current, day(30)).is_ok());
    }

    #[test]
    fn test_parse_classifications() {
        assert_eq!(parse_energy_type("eolic").unwrap(), EnergyType::Eolic);
        assert_eq!(parse_energy_type("coal").unwrap_err().kind(), ErrorKind::InvalidEnergyType);
        assert_eq!(parse_payment_method("pix").unwrap(), PaymentMethod::Pix);
        assert_eq!(parse_payment_method("cash").unwrap_err().kind(), ErrorKind::InvalidPaymentMethod);
    }
}
