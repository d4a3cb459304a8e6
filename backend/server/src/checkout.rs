//! # Checkout
//!
//! Turns a cart into an order.
//!
//! ## Placing
//! 1. Join the cart with current products, reject an empty cart
//! 2. Price it: voucher discount, then points, then shipping
//! 3. Reserve stock line by line, then one voucher use, then the points
//! 4. Persist the order, write the redemption to the ledger, empty the cart
//!
//! Any failure in 3 or 4 gives back everything reserved so far, so a rejected
//! checkout leaves stock, voucher uses and balances as they were.
//!
//! ## Moving
//! Every move claims `{order_id}:{from}` first, so of two concurrent moves out of the
//! same status only one goes through. Final states run side effects:
//! - delivered credits the points earned
//! - cancelled restocks, returns the voucher use and refunds redeemed points
//!
//! A move that fails after its claim undoes its side effects and frees the claim.
use chrono::Utc;
use serde::Deserialize;
use shop::{
    cart::CartAction,
    models::{
        LoyaltyReason, Order, OrderItem, OrderStatus, PaymentMethod, Product, ShippingInfo,
        StatusChange, Voucher, new_id,
    },
    pricing::{Quote, VoucherError, calc_voucher_discount, quote},
};
use tracing::{info, warn};

use crate::{
    error::AppError,
    loyalty,
    routes::{
        cart::{load_cart, resolve_cart, save_cart, subtotal},
        vouchers::find_voucher,
    },
    store::{
        Db, StoreError,
        collections::ORDERS,
        counters::{POINTS, STOCK, VOUCHER_USES},
        indexes::{ORDER_NUMBER, ORDER_STEP},
    },
    utils::{non_empty, order_number},
};

const ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Deserialize, Debug)]
pub struct CheckoutInput {
    pub shipping: ShippingInfo,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub voucher_code: Option<String>,
    #[serde(default)]
    pub redeem_points: u64,
}

#[derive(Default)]
struct Reservations {
    stock: Vec<(String, u64)>,
    voucher: Option<String>,
    points: u64,
}

impl Reservations {
    async fn release(self, db: &Db, customer_id: &str) -> Result<(), StoreError> {
        for (product_id, quantity) in &self.stock {
            db.release(STOCK, product_id, *quantity).await?;
        }

        if let Some(voucher_id) = &self.voucher {
            db.unclaim(VOUCHER_USES, voucher_id, 1).await?;
        }

        if self.points > 0 {
            db.release(POINTS, customer_id, self.points).await?;
        }

        Ok(())
    }

    /// Gives everything back and returns `error`.
    async fn abort(self, db: &Db, customer_id: &str, error: AppError) -> AppError {
        if let Err(e) = self.release(db, customer_id).await {
            warn!("Failed to release checkout reservations for {customer_id}: {e}");
        }

        error
    }
}

fn validate_shipping(shipping: ShippingInfo) -> Result<ShippingInfo, AppError> {
    let phone = non_empty("phone", &shipping.phone)?;
    let digits = phone.chars().filter(char::is_ascii_digit).count();

    if !(9..=15).contains(&digits)
        || !phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '.'))
    {
        return Err(AppError::MalformedPayload(format!("invalid phone number {phone:?}")));
    }

    Ok(ShippingInfo {
        name: non_empty("name", &shipping.name)?,
        phone,
        address: non_empty("address", &shipping.address)?,
    })
}

fn order_items(lines: &[(Product, u32)]) -> Vec<OrderItem> {
    lines
        .iter()
        .map(|(product, quantity)| OrderItem {
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            unit_price: product.price,
            quantity: *quantity,
            line_total: product.price * *quantity as u64,
        })
        .collect()
}

async fn claim_order_number(db: &Db, order_id: &str) -> Result<String, AppError> {
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let number = order_number(Utc::now());
        if db.store().claim_index(ORDER_NUMBER, &number, order_id).await? {
            return Ok(number);
        }
    }

    Err(AppError::Conflict("could not allocate an order number".to_string()))
}

/// Prices the cart without reserving anything.
pub async fn price_cart(
    db: &Db,
    customer_id: &str,
    voucher: Option<&Voucher>,
    redeem_points: u64,
) -> Result<(Vec<(Product, u32)>, Quote), AppError> {
    let (_, lines) = resolve_cart(db, customer_id).await?;
    if lines.is_empty() {
        return Err(AppError::MalformedPayload("cart is empty".to_string()));
    }

    let subtotal = subtotal(&lines);
    let voucher_discount = match voucher {
        Some(voucher) => calc_voucher_discount(voucher, subtotal, customer_id, Utc::now())?,
        None => 0,
    };
    let balance = loyalty::balance(db, customer_id).await?;

    Ok((lines, quote(subtotal, voucher_discount, redeem_points, balance)))
}

pub async fn place_order(db: &Db, customer_id: &str, input: CheckoutInput) -> Result<Order, AppError> {
    let shipping = validate_shipping(input.shipping)?;

    let voucher = match input.voucher_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => Some(find_voucher(db, code).await?),
        _ => None,
    };

    let (lines, quote) = price_cart(db, customer_id, voucher.as_ref(), input.redeem_points).await?;

    let mut reserved = Reservations::default();

    for (product, quantity) in &lines {
        let quantity = *quantity as u64;
        match db.reserve(STOCK, &product.id, quantity).await {
            Ok(true) => reserved.stock.push((product.id.clone(), quantity)),
            Ok(false) => {
                let error = AppError::Conflict(format!("{} is out of stock", product.name));
                return Err(reserved.abort(db, customer_id, error).await);
            }
            Err(e) => return Err(reserved.abort(db, customer_id, e.into()).await),
        }
    }

    if let Some(voucher) = &voucher {
        match db
            .claim_within(VOUCHER_USES, &voucher.id, 1, voucher.usage_limit)
            .await
        {
            Ok(true) => reserved.voucher = Some(voucher.id.clone()),
            Ok(false) => {
                let error = AppError::Voucher(VoucherError::Exhausted);
                return Err(reserved.abort(db, customer_id, error).await);
            }
            Err(e) => return Err(reserved.abort(db, customer_id, e.into()).await),
        }
    }

    if quote.points_redeemed > 0 {
        match db.reserve(POINTS, customer_id, quote.points_redeemed).await {
            Ok(true) => reserved.points = quote.points_redeemed,
            Ok(false) => {
                let error = AppError::Conflict("loyalty balance changed, please retry".to_string());
                return Err(reserved.abort(db, customer_id, error).await);
            }
            Err(e) => return Err(reserved.abort(db, customer_id, e.into()).await),
        }
    }

    let id = new_id();
    let number = match claim_order_number(db, &id).await {
        Ok(number) => number,
        Err(e) => return Err(reserved.abort(db, customer_id, e).await),
    };

    let now = Utc::now();
    let order = Order {
        id,
        number,
        customer_id: customer_id.to_string(),
        items: order_items(&lines),
        shipping,
        payment_method: input.payment_method,
        note: input
            .note
            .map(|note| note.trim().to_string())
            .filter(|note| !note.is_empty()),
        voucher_id: voucher.as_ref().map(|v| v.id.clone()),
        voucher_code: voucher.as_ref().map(|v| v.code.clone()),
        quote,
        status: OrderStatus::Pending,
        history: vec![StatusChange {
            status: OrderStatus::Pending,
            at: now,
            by: Some(customer_id.to_string()),
        }],
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = db.save(ORDERS, &order.id, &order).await {
        if let Err(e) = db.store().release_index(ORDER_NUMBER, &order.number).await {
            warn!("Failed to release order number {}: {e}", order.number);
        }
        return Err(reserved.abort(db, customer_id, e.into()).await);
    }

    // The order stands from here on, bookkeeping failures are only logged
    if order.quote.points_redeemed > 0 {
        if let Err(e) = write_redemption(db, customer_id, &order).await {
            warn!("Failed to record redemption for order {}: {e}", order.number);
        }
    }

    if let Err(e) = empty_cart(db, customer_id).await {
        warn!("Failed to empty cart of {customer_id} after order {}: {e}", order.number);
    }

    info!(
        "Order {} placed by {customer_id}: {} VND",
        order.number, order.quote.total
    );

    Ok(order)
}

async fn write_redemption(db: &Db, customer_id: &str, order: &Order) -> Result<(), AppError> {
    let balance_after = loyalty::balance(db, customer_id).await?;
    loyalty::record_redemption(db, customer_id, order, balance_after).await?;

    Ok(())
}

async fn empty_cart(db: &Db, customer_id: &str) -> Result<(), AppError> {
    let mut cart = load_cart(db, customer_id).await?;
    cart.apply(CartAction::Clear)?;
    save_cart(db, customer_id, &cart).await
}

/// Key claimed by the move out of `status`. Statuses never repeat, so each key is
/// claimed at most once and concurrent moves from the same status cannot both win.
fn step_key(order_id: &str, status: OrderStatus) -> String {
    format!("{order_id}:{}", status.as_str())
}

/// What a final move gave back or credited, so a failed move can take it back.
#[derive(Default)]
struct Settlement {
    restocked: Vec<(String, u64)>,
    voucher: Option<String>,
    points: u64,
}

impl Settlement {
    async fn undo(self, db: &Db, order: &Order) -> Result<(), AppError> {
        for (product_id, quantity) in &self.restocked {
            db.unclaim(STOCK, product_id, *quantity).await?;
        }

        if let Some(voucher_id) = &self.voucher {
            db.release(VOUCHER_USES, voucher_id, 1).await?;
        }

        if self.points > 0 {
            let note = Some(format!("reverted {}", order.number));
            let reverted = loyalty::debit(
                db,
                &order.customer_id,
                self.points,
                LoyaltyReason::Adjusted,
                Some(&order.id),
                note,
            )
            .await?;

            if reverted.is_none() {
                warn!(
                    "Could not take back {} points from {} for order {}",
                    self.points, order.customer_id, order.number
                );
            }
        }

        Ok(())
    }
}

/// Moves an order to `next`. Cancelling restocks, returns the voucher use and refunds
/// redeemed points; delivering credits the points earned. A move that fails part way
/// takes its side effects back and can be retried.
pub async fn transition(
    db: &Db,
    mut order: Order,
    next: OrderStatus,
    by: &str,
) -> Result<Order, AppError> {
    let current = order.status;
    if !current.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "cannot move order from {} to {}",
            current.as_str(),
            next.as_str()
        )));
    }

    let step = step_key(&order.id, current);
    if !db.store().claim_index(ORDER_STEP, &step, next.as_str()).await? {
        return Err(AppError::Conflict(format!(
            "order was already moved on from {}",
            current.as_str()
        )));
    }

    let mut settled = Settlement::default();
    if let Err(e) = settle(db, &order, next, &mut settled).await {
        return Err(rollback(db, &order, &step, settled, e).await);
    }

    let now = Utc::now();
    order.status = next;
    order.updated_at = now;
    order.history.push(StatusChange {
        status: next,
        at: now,
        by: Some(by.to_string()),
    });

    if let Err(e) = db.save(ORDERS, &order.id, &order).await {
        return Err(rollback(db, &order, &step, settled, e.into()).await);
    }

    info!("Order {} is now {}", order.number, next.as_str());

    Ok(order)
}

async fn settle(
    db: &Db,
    order: &Order,
    next: OrderStatus,
    settled: &mut Settlement,
) -> Result<(), AppError> {
    match next {
        OrderStatus::Cancelled => {
            for item in &order.items {
                let quantity = item.quantity as u64;
                db.release(STOCK, &item.product_id, quantity).await?;
                settled.restocked.push((item.product_id.clone(), quantity));
            }

            if let Some(voucher_id) = &order.voucher_id {
                db.unclaim(VOUCHER_USES, voucher_id, 1).await?;
                settled.voucher = Some(voucher_id.clone());
            }

            credit_points(db, order, order.quote.points_redeemed, LoyaltyReason::Refunded).await?;
            settled.points = order.quote.points_redeemed;
        }
        OrderStatus::Delivered => {
            credit_points(db, order, order.quote.points_earned, LoyaltyReason::Earned).await?;
            settled.points = order.quote.points_earned;
        }
        _ => {}
    }

    Ok(())
}

async fn credit_points(
    db: &Db,
    order: &Order,
    points: u64,
    reason: LoyaltyReason,
) -> Result<(), AppError> {
    loyalty::credit(
        db,
        &order.customer_id,
        points,
        reason,
        Some(&order.id),
        Some(order.number.clone()),
    )
    .await?;

    Ok(())
}

/// Takes back what `settle` did, frees the step and returns `error`.
async fn rollback(
    db: &Db,
    order: &Order,
    step: &str,
    settled: Settlement,
    error: AppError,
) -> AppError {
    if let Err(e) = settled.undo(db, order).await {
        warn!("Failed to undo settlement of order {}: {e}", order.number);
    }

    if let Err(e) = db.store().release_index(ORDER_STEP, step).await {
        warn!("Failed to release step {step} of order {}: {e}", order.number);
    }

    error
}
