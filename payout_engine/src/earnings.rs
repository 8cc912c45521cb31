//! The Earnings Calculator.
//!
//! Given a paid order, works out how much of it belongs to each vendor once the platform's processing fee and the
//! per-transfer fee have been taken off. This is pure arithmetic; persisting the result is the job of
//! [`crate::SettlementApi::process_paid_order`].
//!
//! The processing fee is charged once, on the whole transaction (`total_price × rate + fixed`), and then attributed to
//! vendors in proportion to their share of the items subtotal. Shipping is not attributed to anyone and stays with the
//! platform. Shares are allocated with the largest-remainder method so that they always add up to the (banker's
//! rounded) platform fee exactly.
use std::collections::BTreeMap;

use log::*;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Cents, NewOrder};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EarningsError {
    #[error("Order {0} has no line items")]
    EmptyOrder(String),
    #[error("Order {order_id} has a line item with an invalid quantity of {quantity}")]
    InvalidQuantity { order_id: String, quantity: i64 },
    #[error("Order {order_id} has a line item with a negative price of {price}")]
    NegativePrice { order_id: String, price: Cents },
    #[error("Order {order_id} total of {total} is less than the items subtotal of {subtotal}")]
    TotalBelowSubtotal { order_id: String, total: Cents, subtotal: Cents },
    #[error("Invalid fee schedule: {0}")]
    InvalidFeeSchedule(String),
    #[error("Arithmetic overflow while calculating earnings for order {0}")]
    Overflow(String),
}

/// The fees the platform takes off each sale. These come from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Proportional processing fee, e.g. `0.014` for 1.4%
    pub processing_rate: Decimal,
    /// Fixed processing fee, charged once per order
    pub processing_fixed: Cents,
    /// Fixed fee charged once per vendor transfer
    pub transfer_fee: Cents,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self { processing_rate: Decimal::new(14, 3), processing_fixed: Cents::from(25), transfer_fee: Cents::from(25) }
    }
}

impl FeeSchedule {
    pub fn new(processing_rate: Decimal, processing_fixed: Cents, transfer_fee: Cents) -> Self {
        Self { processing_rate, processing_fixed, transfer_fee }
    }

    pub fn validate(&self) -> Result<(), EarningsError> {
        if self.processing_rate.is_sign_negative() || self.processing_rate >= Decimal::ONE {
            return Err(EarningsError::InvalidFeeSchedule(format!(
                "processing rate must be in [0, 1), got {}",
                self.processing_rate
            )));
        }
        if self.processing_fixed.is_negative() || self.transfer_fee.is_negative() {
            return Err(EarningsError::InvalidFeeSchedule("fixed fees cannot be negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorEarnings {
    pub vendor_id: i64,
    pub gross_amount: Cents,
    /// This vendor's share of the platform processing fee, rounded to cents
    pub processing_fee: Cents,
    /// The unrounded share, in cents
    pub processing_fee_exact: Decimal,
    pub transfer_fee: Cents,
    /// `gross - processing_fee - transfer_fee`, never less than zero
    pub net_amount: Cents,
    /// Fees the platform wrote off because they exceeded the vendor's gross
    pub fee_absorbed: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsBreakdown {
    pub total_price: Cents,
    pub items_subtotal: Cents,
    /// `total_price × rate + fixed`, in cents, before rounding
    pub processing_fee_exact: Decimal,
    pub processing_fee: Cents,
    pub transfer_fees: Cents,
    /// What the platform keeps over and above the fees: `total_price - items_subtotal` (shipping)
    pub platform_retained: Cents,
    pub fee_absorbed: Cents,
    /// One entry per distinct vendor, in ascending vendor id order
    pub vendors: Vec<VendorEarnings>,
}

impl EarningsBreakdown {
    pub fn total_net(&self) -> Cents {
        self.vendors.iter().map(|v| v.net_amount).sum()
    }

    /// Everything the breakdown accounts for. This is always equal to `total_price`.
    pub fn total_accounted(&self) -> Cents {
        self.total_net() + self.processing_fee + self.transfer_fees + self.platform_retained - self.fee_absorbed
    }

    pub fn for_vendor(&self, vendor_id: i64) -> Option<&VendorEarnings> {
        self.vendors.iter().find(|v| v.vendor_id == vendor_id)
    }
}

/// Splits a paid order into per-vendor earnings.
pub fn calculate_earnings(order: &NewOrder, fees: &FeeSchedule) -> Result<EarningsBreakdown, EarningsError> {
    fees.validate()?;
    let order_id = order.order_id.as_str();
    if order.items.is_empty() {
        return Err(EarningsError::EmptyOrder(order_id.to_string()));
    }
    let mut gross_by_vendor = BTreeMap::<i64, Cents>::new();
    for item in &order.items {
        if item.quantity <= 0 {
            return Err(EarningsError::InvalidQuantity { order_id: order_id.to_string(), quantity: item.quantity });
        }
        if item.unit_price.is_negative() {
            return Err(EarningsError::NegativePrice { order_id: order_id.to_string(), price: item.unit_price });
        }
        let line_total = item
            .unit_price
            .value()
            .checked_mul(item.quantity)
            .ok_or_else(|| EarningsError::Overflow(order_id.to_string()))?;
        let gross = gross_by_vendor.entry(item.vendor_id).or_default();
        let sum = gross.value().checked_add(line_total).ok_or_else(|| EarningsError::Overflow(order_id.to_string()))?;
        *gross = Cents::from(sum);
    }
    let items_subtotal = gross_by_vendor
        .values()
        .try_fold(0i64, |acc, gross| acc.checked_add(gross.value()))
        .map(Cents::from)
        .ok_or_else(|| EarningsError::Overflow(order_id.to_string()))?;
    if order.total_price < items_subtotal {
        return Err(EarningsError::TotalBelowSubtotal {
            order_id: order_id.to_string(),
            total: order.total_price,
            subtotal: items_subtotal,
        });
    }

    let processing_fee_exact =
        order.total_price.to_decimal() * fees.processing_rate + fees.processing_fixed.to_decimal();
    let processing_fee =
        Cents::from_decimal_rounded(processing_fee_exact).map_err(|_| EarningsError::Overflow(order_id.to_string()))?;
    trace!("🧮️ Order {}: subtotal {items_subtotal}, processing fee {processing_fee_exact} -> {processing_fee}", order.order_id);

    let weights = gross_by_vendor.iter().map(|(id, gross)| (*id, gross.to_decimal())).collect::<Vec<_>>();
    let shares = allocate_proportionally(processing_fee, processing_fee_exact, &weights)
        .ok_or_else(|| EarningsError::Overflow(order_id.to_string()))?;

    let vendors = gross_by_vendor
        .iter()
        .zip(shares)
        .map(|((vendor_id, gross), (share, share_exact))| {
            let net_raw = gross
                .value()
                .checked_sub(share.value())
                .and_then(|n| n.checked_sub(fees.transfer_fee.value()))
                .map(Cents::from)
                .ok_or_else(|| EarningsError::Overflow(order_id.to_string()))?;
            let net_amount = net_raw.max(Cents::ZERO);
            let fee_absorbed = net_amount - net_raw;
            if fee_absorbed.is_positive() {
                warn!("🧮️ Fees for vendor #{vendor_id} on order {} exceed their gross of {gross}. {fee_absorbed} absorbed by the platform.", order.order_id);
            }
            Ok(VendorEarnings {
                vendor_id: *vendor_id,
                gross_amount: *gross,
                processing_fee: share,
                processing_fee_exact: share_exact,
                transfer_fee: fees.transfer_fee,
                net_amount,
                fee_absorbed,
            })
        })
        .collect::<Result<Vec<_>, EarningsError>>()?;
    let transfer_fees = i64::try_from(vendors.len())
        .ok()
        .and_then(|n| fees.transfer_fee.value().checked_mul(n))
        .map(Cents::from)
        .ok_or_else(|| EarningsError::Overflow(order_id.to_string()))?;
    let fee_absorbed = vendors.iter().map(|v| v.fee_absorbed).sum();
    let breakdown = EarningsBreakdown {
        total_price: order.total_price,
        items_subtotal,
        processing_fee_exact,
        processing_fee,
        transfer_fees,
        platform_retained: order.total_price - items_subtotal,
        fee_absorbed,
        vendors,
    };
    debug!(
        "🧮️ Order {} split between {} vendors. Net payable: {}, fees: {}",
        order.order_id,
        breakdown.vendors.len(),
        breakdown.total_net(),
        breakdown.processing_fee + breakdown.transfer_fees
    );
    Ok(breakdown)
}

/// Largest-remainder allocation of `exact_total` over `weights`, rounded so that the shares add up to `total` (the
/// rounded value of `exact_total`). Returns `(rounded_share, exact_share)` for each weight, in order. Every rounded
/// share is within one cent of its exact share. If every weight is zero, the total is split evenly.
fn allocate_proportionally(total: Cents, exact_total: Decimal, weights: &[(i64, Decimal)]) -> Option<Vec<(Cents, Decimal)>> {
    if weights.is_empty() {
        return Some(Vec::new());
    }
    let weight_sum: Decimal = weights.iter().map(|(_, w)| *w).sum();
    let (weights, weight_sum) = if weight_sum.is_zero() {
        (weights.iter().map(|(id, _)| (*id, Decimal::ONE)).collect::<Vec<_>>(), Decimal::from(weights.len()))
    } else {
        (weights.to_vec(), weight_sum)
    };
    let mut allocated = Vec::with_capacity(weights.len());
    for (_, w) in &weights {
        let exact = exact_total * *w / weight_sum;
        let floor = exact.floor();
        allocated.push((floor.to_i64()?, exact - floor, exact));
    }
    // Σ floor <= exact_total and |total - exact_total| <= 0.5, so this lands in 0..=n
    let mut leftover = total.value() - allocated.iter().map(|(f, _, _)| *f).sum::<i64>();
    let mut ranking = (0..allocated.len()).collect::<Vec<_>>();
    // Biggest fractional part first; ties go to the earlier entry
    ranking.sort_by(|&a, &b| allocated[b].1.cmp(&allocated[a].1).then(a.cmp(&b)));
    for idx in ranking {
        if leftover <= 0 {
            break;
        }
        allocated[idx].0 += 1;
        leftover -= 1;
    }
    Some(allocated.into_iter().map(|(cents, _, exact)| (Cents::from(cents), exact)).collect())
}

#[cfg(test)]
mod test {
    use rand::Rng;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db_types::{NewOrderItem, OrderId};

    fn order(total: i64, items: &[(i64, i64, i64)]) -> NewOrder {
        items.iter().fold(NewOrder::new(OrderId::from("1"), "buyer", Cents::from(total)), |o, (v, p, q)| {
            o.with_item(NewOrderItem::new(*v, "item", Cents::from(*p), *q))
        })
    }

    #[test]
    fn single_vendor_with_shipping() {
        // €100 of goods plus €3 shipping
        let order = order(10_300, &[(1, 10_000, 1)]);
        let result = calculate_earnings(&order, &FeeSchedule::default()).unwrap();
        assert_eq!(result.processing_fee_exact, dec!(169.2));
        assert_eq!(result.processing_fee, Cents::from(169));
        assert_eq!(result.items_subtotal, Cents::from(10_000));
        assert_eq!(result.platform_retained, Cents::from(300));
        let vendor = result.for_vendor(1).unwrap();
        assert_eq!(vendor.gross_amount, Cents::from(10_000));
        assert_eq!(vendor.processing_fee, Cents::from(169));
        assert_eq!(vendor.transfer_fee, Cents::from(25));
        assert_eq!(vendor.net_amount, Cents::from(9806));
        // €103 collected, €98.06 paid out
        assert_eq!(result.total_price - result.total_net(), Cents::from(494));
        assert_eq!(result.total_accounted(), Cents::from(10_300));
    }

    #[test]
    fn fee_is_split_proportionally() {
        let order = order(10_000, &[(7, 2_500, 2), (3, 5_000, 1)]);
        let result = calculate_earnings(&order, &FeeSchedule::default()).unwrap();
        // 10000 * 0.014 + 25 = 165. Both vendors have the same gross.
        assert_eq!(result.processing_fee, Cents::from(165));
        assert_eq!(result.vendors.len(), 2);
        assert_eq!(result.vendors[0].vendor_id, 3);
        let shares = result.vendors.iter().map(|v| v.processing_fee.value()).collect::<Vec<_>>();
        assert_eq!(shares, vec![83, 82]);
        assert_eq!(result.transfer_fees, Cents::from(50));
        assert_eq!(result.total_accounted(), order.total_price);
    }

    #[test]
    fn tiny_sale_is_floored_at_zero() {
        let order = order(1_000, &[(1, 980, 1), (2, 20, 1)]);
        let result = calculate_earnings(&order, &FeeSchedule::default()).unwrap();
        let small = result.for_vendor(2).unwrap();
        assert_eq!(small.net_amount, Cents::ZERO);
        assert!(small.fee_absorbed.is_positive());
        assert_eq!(result.fee_absorbed, small.fee_absorbed);
        assert_eq!(result.total_accounted(), order.total_price);
    }

    #[test]
    fn invalid_orders() {
        let fees = FeeSchedule::default();
        assert!(matches!(calculate_earnings(&order(100, &[]), &fees), Err(EarningsError::EmptyOrder(_))));
        assert!(matches!(
            calculate_earnings(&order(100, &[(1, 100, 0)]), &fees),
            Err(EarningsError::InvalidQuantity { quantity: 0, .. })
        ));
        assert!(matches!(
            calculate_earnings(&order(100, &[(1, -100, 1)]), &fees),
            Err(EarningsError::NegativePrice { .. })
        ));
        assert!(matches!(
            calculate_earnings(&order(100, &[(1, 60, 2)]), &fees),
            Err(EarningsError::TotalBelowSubtotal { .. })
        ));
        let bad_fees = FeeSchedule::new(dec!(-0.01), Cents::ZERO, Cents::ZERO);
        assert!(matches!(
            calculate_earnings(&order(100, &[(1, 100, 1)]), &bad_fees),
            Err(EarningsError::InvalidFeeSchedule(_))
        ));
    }

    #[test]
    fn huge_orders_report_overflow() {
        let fees = FeeSchedule::new(Decimal::ZERO, Cents::ZERO, Cents::ZERO);
        let half = i64::MAX / 2 + 1;
        // Two lines for the same vendor
        let result = calculate_earnings(&order(i64::MAX, &[(1, half, 1), (1, half, 1)]), &fees);
        assert!(matches!(result, Err(EarningsError::Overflow(_))), "{result:?}");
        // One line each for two vendors
        let result = calculate_earnings(&order(i64::MAX, &[(1, half, 1), (2, half, 1)]), &fees);
        assert!(matches!(result, Err(EarningsError::Overflow(_))), "{result:?}");
        let result = calculate_earnings(&order(i64::MAX, &[(1, half, 3)]), &fees);
        assert!(matches!(result, Err(EarningsError::Overflow(_))), "{result:?}");
        // Fees large enough to push the net amount below i64::MIN
        let fees = FeeSchedule::new(Decimal::ZERO, Cents::from(i64::MAX / 2), Cents::from(i64::MAX));
        let result = calculate_earnings(&order(100, &[(1, 100, 1)]), &fees);
        assert!(matches!(result, Err(EarningsError::Overflow(_))), "{result:?}");
        // Just under the limit is fine
        let fees = FeeSchedule::new(Decimal::ZERO, Cents::ZERO, Cents::ZERO);
        let result = calculate_earnings(&order(i64::MAX, &[(1, i64::MAX / 2, 1), (1, i64::MAX / 2, 1)]), &fees).unwrap();
        assert_eq!(result.items_subtotal, Cents::from(i64::MAX - 1));
    }

    #[test]
    fn breakdown_always_accounts_for_total() {
        let mut rng = rand::thread_rng();
        let fees = FeeSchedule::new(dec!(0.029), Cents::from(30), Cents::from(25));
        for _ in 0..500 {
            let n = rng.gen_range(1..6);
            let items = (0..n)
                .map(|_| (rng.gen_range(1..4), rng.gen_range(0..20_000), rng.gen_range(1..4)))
                .collect::<Vec<_>>();
            let subtotal: i64 = items.iter().map(|(_, p, q)| p * q).sum();
            let total = subtotal + rng.gen_range(0..1_000);
            let order = order(total, &items);
            let result = calculate_earnings(&order, &fees).unwrap();
            assert_eq!(result.total_accounted(), order.total_price);
            let shares: Cents = result.vendors.iter().map(|v| v.processing_fee).sum();
            assert_eq!(shares, result.processing_fee);
            assert!((result.processing_fee.to_decimal() - result.processing_fee_exact).abs() <= dec!(0.5));
            for v in &result.vendors {
                assert!(!v.net_amount.is_negative());
                assert!((v.processing_fee.to_decimal() - v.processing_fee_exact).abs() < Decimal::ONE);
            }
        }
    }
}
