//! # Pricing
//!
//! All money is integer VND.
//!
//! ## Order of operations
//! 1. Subtotal: sum of `unit_price * quantity`
//! 2. Voucher discount, computed on the subtotal
//! 3. Loyalty redemption, bounded by what is left after the voucher
//! 4. Shipping, decided by the subtotal alone
//!
//! Points earned are 10% of the merchandise actually paid (shipping excluded),
//! where one point is worth 1000 VND.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{DiscountKind, Voucher};

pub const POINT_VALUE_VND: u64 = 1_000;
pub const EARN_RATE_PERCENT: u64 = 10;
pub const SHIPPING_FEE_VND: u64 = 30_000;
pub const FREE_SHIPPING_THRESHOLD_VND: u64 = 300_000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VoucherError {
    #[error("Voucher is not active")]
    Inactive,

    #[error("Voucher is not valid yet")]
    NotStarted,

    #[error("Voucher has expired")]
    Expired,

    #[error("Voucher usage limit reached")]
    Exhausted,

    #[error("Order must be at least {min} VND to use this voucher")]
    BelowMinimum { min: u64 },

    #[error("Voucher belongs to another customer")]
    NotAssigned,

    #[error("Invalid voucher value")]
    InvalidValue,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Quote {
    pub subtotal: u64,
    pub voucher_discount: u64,
    pub points_redeemed: u64,
    pub points_discount: u64,
    pub shipping_fee: u64,
    pub total: u64,
    pub points_earned: u64,
}

pub fn validate_voucher_value(kind: DiscountKind, value: u64) -> Result<(), VoucherError> {
    match kind {
        DiscountKind::Percentage if !(1..=100).contains(&value) => Err(VoucherError::InvalidValue),
        DiscountKind::Fixed if value == 0 => Err(VoucherError::InvalidValue),
        _ => Ok(()),
    }
}

/// Discount a voucher grants on `subtotal`, checked against its window, limit and owner.
pub fn calc_voucher_discount(
    voucher: &Voucher,
    subtotal: u64,
    customer_id: &str,
    now: DateTime<Utc>,
) -> Result<u64, VoucherError> {
    if !voucher.active {
        return Err(VoucherError::Inactive);
    }

    if voucher.starts_at.is_some_and(|start| now < start) {
        return Err(VoucherError::NotStarted);
    }

    if voucher.expires_at.is_some_and(|end| now >= end) {
        return Err(VoucherError::Expired);
    }

    if voucher
        .usage_limit
        .is_some_and(|limit| voucher.used_count >= limit)
    {
        return Err(VoucherError::Exhausted);
    }

    if voucher
        .assigned_to
        .as_deref()
        .is_some_and(|owner| owner != customer_id)
    {
        return Err(VoucherError::NotAssigned);
    }

    if subtotal < voucher.min_order_value {
        return Err(VoucherError::BelowMinimum {
            min: voucher.min_order_value,
        });
    }

    validate_voucher_value(voucher.kind, voucher.value)?;

    let discount = match voucher.kind {
        DiscountKind::Percentage => {
            let raw = subtotal * voucher.value / 100;
            voucher.max_discount.map_or(raw, |cap| raw.min(cap))
        }
        DiscountKind::Fixed => voucher.value,
    };

    Ok(discount.min(subtotal))
}

pub fn points_earned(paid: u64) -> u64 {
    paid * EARN_RATE_PERCENT / 100 / POINT_VALUE_VND
}

pub fn points_value(points: u64) -> u64 {
    points * POINT_VALUE_VND
}

pub fn max_redeemable_points(balance: u64, payable: u64) -> u64 {
    balance.min(payable / POINT_VALUE_VND)
}

pub fn shipping_fee(subtotal: u64) -> u64 {
    if subtotal >= FREE_SHIPPING_THRESHOLD_VND {
        0
    } else {
        SHIPPING_FEE_VND
    }
}

pub fn quote(subtotal: u64, voucher_discount: u64, requested_points: u64, balance: u64) -> Quote {
    let voucher_discount = voucher_discount.min(subtotal);
    let payable = subtotal - voucher_discount;

    let points_redeemed = requested_points.min(max_redeemable_points(balance, payable));
    let points_discount = points_value(points_redeemed);
    let merchandise = payable - points_discount;

    let shipping_fee = shipping_fee(subtotal);

    Quote {
        subtotal,
        voucher_discount,
        points_redeemed,
        points_discount,
        shipping_fee,
        total: merchandise + shipping_fee,
        points_earned: points_earned(merchandise),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn voucher(kind: DiscountKind, value: u64) -> Voucher {
        Voucher {
            id: "v1".to_string(),
            code: "WELCOME".to_string(),
            kind,
            value,
            min_order_value: 0,
            max_discount: None,
            usage_limit: None,
            used_count: 0,
            starts_at: None,
            expires_at: None,
            active: true,
            assigned_to: None,
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_percentage_with_cap() {
        let mut v = voucher(DiscountKind::Percentage, 20);
        assert_eq!(calc_voucher_discount(&v, 200_000, "c1", Utc::now()), Ok(40_000));

        v.max_discount = Some(25_000);
        assert_eq!(calc_voucher_discount(&v, 200_000, "c1", Utc::now()), Ok(25_000));
    }

    #[test]
    fn test_fixed_never_exceeds_subtotal() {
        let v = voucher(DiscountKind::Fixed, 50_000);

        assert_eq!(calc_voucher_discount(&v, 35_000, "c1", Utc::now()), Ok(35_000));
        assert_eq!(calc_voucher_discount(&v, 90_000, "c1", Utc::now()), Ok(50_000));
    }

    #[test]
    fn test_rejections() {
        let now = Utc::now();
        let mut v = voucher(DiscountKind::Fixed, 10_000);

        v.min_order_value = 100_000;
        assert_eq!(
            calc_voucher_discount(&v, 99_999, "c1", now),
            Err(VoucherError::BelowMinimum { min: 100_000 })
        );

        v.min_order_value = 0;
        v.usage_limit = Some(3);
        v.used_count = 3;
        assert_eq!(calc_voucher_discount(&v, 1, "c1", now), Err(VoucherError::Exhausted));

        v.usage_limit = None;
        v.expires_at = Some(now);
        assert_eq!(calc_voucher_discount(&v, 1, "c1", now), Err(VoucherError::Expired));

        v.expires_at = None;
        v.starts_at = Some(now + Duration::hours(1));
        assert_eq!(calc_voucher_discount(&v, 1, "c1", now), Err(VoucherError::NotStarted));

        v.starts_at = None;
        v.assigned_to = Some("c2".to_string());
        assert_eq!(calc_voucher_discount(&v, 1, "c1", now), Err(VoucherError::NotAssigned));
        assert_eq!(calc_voucher_discount(&v, 1, "c2", now), Ok(1));

        v.active = false;
        assert_eq!(calc_voucher_discount(&v, 1, "c2", now), Err(VoucherError::Inactive));
    }

    #[test]
    fn test_percentage_bounds() {
        assert_eq!(
            validate_voucher_value(DiscountKind::Percentage, 0),
            Err(VoucherError::InvalidValue)
        );
        assert_eq!(
            validate_voucher_value(DiscountKind::Percentage, 101),
            Err(VoucherError::InvalidValue)
        );
        assert!(validate_voucher_value(DiscountKind::Percentage, 100).is_ok());
    }

    #[test]
    fn test_points_math() {
        assert_eq!(points_earned(250_000), 25);
        assert_eq!(points_earned(9_999), 0);
        assert_eq!(points_earned(19_999), 1);
        assert_eq!(points_value(7), 7_000);
        assert_eq!(max_redeemable_points(100, 45_500), 45);
        assert_eq!(max_redeemable_points(3, 45_500), 3);
    }

    #[test]
    fn test_quote() {
        let q = quote(120_000, 20_000, 500, 30);

        assert_eq!(q.points_redeemed, 30);
        assert_eq!(q.points_discount, 30_000);
        assert_eq!(q.shipping_fee, SHIPPING_FEE_VND);
        assert_eq!(q.total, 70_000 + SHIPPING_FEE_VND);
        assert_eq!(q.points_earned, 7);
    }

    #[test]
    fn test_quote_free_shipping_and_full_redemption() {
        let q = quote(300_000, 0, 1_000, 1_000);

        assert_eq!(q.shipping_fee, 0);
        assert_eq!(q.points_redeemed, 300);
        assert_eq!(q.total, 0);
        assert_eq!(q.points_earned, 0);
    }
}
