//! Money arithmetic for orders, bundles and purchase orders.
//!
//! All results are rounded to cents with banker's rounding, matching
//! `NUMERIC(12,2)` storage.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::bundles::BundlePricing;
use crate::domain::MAX_MONEY;

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { discount: Decimal, subtotal: Decimal },
    #[error("order total exceeds the largest storable amount {}", MAX_MONEY)]
    TotalTooLarge,
}

/// `grand = subtotal - discount + shipping + tax`
pub fn order_totals(
    line_totals: &[Decimal],
    discount_total: Decimal,
    shipping_total: Decimal,
    tax_total: Decimal,
) -> Result<OrderTotals, PricingError> {
    let subtotal = line_totals
        .iter()
        .try_fold(Decimal::ZERO, |acc, line| acc.checked_add(*line))
        .map(round_money)
        .ok_or(PricingError::TotalTooLarge)?;
    let discount_total = round_money(discount_total);
    if discount_total > subtotal {
        return Err(PricingError::DiscountExceedsSubtotal {
            discount: discount_total,
            subtotal,
        });
    }
    let shipping_total = round_money(shipping_total);
    let tax_total = round_money(tax_total);

    let grand_total = (subtotal - discount_total)
        .checked_add(shipping_total)
        .and_then(|total| total.checked_add(tax_total))
        .filter(|total| *total <= MAX_MONEY)
        .ok_or(PricingError::TotalTooLarge)?;
    if subtotal > MAX_MONEY {
        return Err(PricingError::TotalTooLarge);
    }

    Ok(OrderTotals {
        subtotal,
        discount_total,
        shipping_total,
        tax_total,
        grand_total,
    })
}

/// Price a bundle from `(unit_price, quantity)` pairs and a percentage discount.
pub fn bundle_pricing(items: &[(Decimal, i32)], discount_percent: Decimal) -> BundlePricing {
    let list_price: Decimal = items.iter().map(|(price, qty)| line_total(*price, *qty)).sum();
    let factor = (Decimal::ONE_HUNDRED - discount_percent) / Decimal::ONE_HUNDRED;
    let bundle_price = round_money(list_price * factor);

    BundlePricing {
        list_price,
        bundle_price,
        savings: list_price - bundle_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bankers_rounding() {
        assert_eq!(round_money(dec!(2.345)), dec!(2.34));
        assert_eq!(round_money(dec!(2.355)), dec!(2.36));
        assert_eq!(line_total(dec!(3.333), 3), dec!(10.00));
    }

    #[test]
    fn grand_total_formula() {
        let totals = order_totals(
            &[dec!(19.99), dec!(5.01)],
            dec!(5.00),
            dec!(4.95),
            dec!(1.60),
        )
        .unwrap();
        assert_eq!(totals.subtotal, dec!(25.00));
        assert_eq!(totals.grand_total, dec!(26.55));
    }

    #[test]
    fn discount_cannot_exceed_subtotal() {
        let err = order_totals(&[dec!(10)], dec!(10.01), dec!(0), dec!(0)).unwrap_err();
        assert_eq!(
            err,
            PricingError::DiscountExceedsSubtotal {
                discount: dec!(10.01),
                subtotal: dec!(10.00),
            }
        );
        assert!(order_totals(&[dec!(10)], dec!(10), dec!(0), dec!(0)).is_ok());
    }

    #[test]
    fn oversized_totals_are_rejected() {
        let err = order_totals(&[dec!(1)], dec!(0), Decimal::MAX, Decimal::MAX).unwrap_err();
        assert_eq!(err, PricingError::TotalTooLarge);

        let err = order_totals(&[Decimal::MAX, Decimal::MAX], dec!(0), dec!(0), dec!(0)).unwrap_err();
        assert_eq!(err, PricingError::TotalTooLarge);

        let err = order_totals(&[MAX_MONEY], dec!(0), dec!(0.01), dec!(0)).unwrap_err();
        assert_eq!(err, PricingError::TotalTooLarge);
        assert!(order_totals(&[MAX_MONEY], dec!(0), dec!(0), dec!(0)).is_ok());
    }

    #[test]
    fn bundle_discount() {
        let pricing = bundle_pricing(&[(dec!(12.50), 2), (dec!(7.99), 1)], dec!(15));
        assert_eq!(pricing.list_price, dec!(32.99));
        // 32.99 * 0.85 = 28.0415
        assert_eq!(pricing.bundle_price, dec!(28.04));
        assert_eq!(pricing.savings, dec!(4.95));

        let free = bundle_pricing(&[(dec!(9.99), 1)], dec!(100));
        assert_eq!(free.bundle_price, dec!(0));
        let none = bundle_pricing(&[], dec!(20));
        assert_eq!(none.list_price, dec!(0));
    }
}
