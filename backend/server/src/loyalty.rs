//! # Loyalty
//!
//! Balances are counters, the ledger is a collection of entries. Every balance
//! change writes one entry carrying the balance right after the change.
use chrono::Utc;
use shop::models::{LoyaltyEntry, LoyaltyReason, Order, new_id};
use tracing::info;

use crate::{
    error::AppError,
    store::{Db, collections::LOYALTY, counters::POINTS},
};

pub async fn balance(db: &Db, customer_id: &str) -> Result<u64, AppError> {
    Ok(db.count(POINTS, customer_id).await?)
}

async fn record(
    db: &Db,
    customer_id: &str,
    delta: i64,
    reason: LoyaltyReason,
    order_id: Option<&str>,
    note: Option<String>,
    balance_after: u64,
) -> Result<LoyaltyEntry, AppError> {
    let entry = LoyaltyEntry {
        id: new_id(),
        customer_id: customer_id.to_string(),
        delta,
        reason,
        order_id: order_id.map(str::to_string),
        note,
        balance_after,
        at: Utc::now(),
    };

    db.save(LOYALTY, &entry.id, &entry).await?;

    Ok(entry)
}

pub async fn credit(
    db: &Db,
    customer_id: &str,
    points: u64,
    reason: LoyaltyReason,
    order_id: Option<&str>,
    note: Option<String>,
) -> Result<Option<LoyaltyEntry>, AppError> {
    if points == 0 {
        return Ok(None);
    }

    let balance_after = db.release(POINTS, customer_id, points).await?;
    info!("Credited {points} points to {customer_id} ({reason:?})");

    let entry = record(db, customer_id, points as i64, reason, order_id, note, balance_after).await?;

    Ok(Some(entry))
}

/// Takes points off the balance. Returns `None` when the balance is too small.
pub async fn debit(
    db: &Db,
    customer_id: &str,
    points: u64,
    reason: LoyaltyReason,
    order_id: Option<&str>,
    note: Option<String>,
) -> Result<Option<LoyaltyEntry>, AppError> {
    if !db.reserve(POINTS, customer_id, points).await? {
        return Ok(None);
    }

    let balance_after = balance(db, customer_id).await?;
    info!("Debited {points} points from {customer_id} ({reason:?})");

    let entry = record(
        db,
        customer_id,
        -(points as i64),
        reason,
        order_id,
        note,
        balance_after,
    )
    .await?;

    Ok(Some(entry))
}

/// Ledger entry for points already taken off the balance at checkout.
pub async fn record_redemption(
    db: &Db,
    customer_id: &str,
    order: &Order,
    balance_after: u64,
) -> Result<LoyaltyEntry, AppError> {
    record(
        db,
        customer_id,
        -(order.quote.points_redeemed as i64),
        LoyaltyReason::Redeemed,
        Some(&order.id),
        Some(order.number.clone()),
        balance_after,
    )
    .await
}

/// Newest first.
pub async fn history(db: &Db, customer_id: &str) -> Result<Vec<LoyaltyEntry>, AppError> {
    let mut entries: Vec<LoyaltyEntry> = db
        .load_all::<LoyaltyEntry>(LOYALTY)
        .await?
        .into_iter()
        .filter(|entry| entry.customer_id == customer_id)
        .collect();

    entries.sort_by(|a, b| b.at.cmp(&a.at));

    Ok(entries)
}
