use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use shop::{
    cart::{Cart, CartAction},
    models::Product,
};
use tracing::info;

use crate::{
    auth::AuthUser,
    error::AppError,
    routes::products::{ProductView, active_product, find_product, product_view},
    state::AppState,
    store::{
        Db,
        collections::{CARTS, PRODUCTS},
        counters::STOCK,
    },
};

#[derive(Serialize, Debug)]
pub struct CartLineView {
    pub product: ProductView,
    pub quantity: u32,
    pub line_total: u64,
}

#[derive(Serialize, Debug)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub subtotal: u64,
    pub item_count: u32,
}

pub async fn load_cart(db: &Db, customer_id: &str) -> Result<Cart, AppError> {
    Ok(db.load(CARTS, customer_id).await?.unwrap_or_default())
}

pub async fn save_cart(db: &Db, customer_id: &str, cart: &Cart) -> Result<(), AppError> {
    Ok(db.save(CARTS, customer_id, cart).await?)
}

/// Cart lines joined with current products. Lines whose product was deleted or
/// hidden are dropped from the stored cart.
pub async fn resolve_cart(db: &Db, customer_id: &str) -> Result<(Cart, Vec<(Product, u32)>), AppError> {
    let mut cart = load_cart(db, customer_id).await?;
    let mut resolved = Vec::with_capacity(cart.lines.len());
    let mut stale = Vec::new();

    for line in &cart.lines {
        match db.load::<Product>(PRODUCTS, &line.product_id).await? {
            Some(product) if product.active => resolved.push((product, line.quantity)),
            _ => stale.push(line.product_id.clone()),
        }
    }

    if !stale.is_empty() {
        for product_id in stale {
            cart.apply(CartAction::Remove { product_id })?;
        }
        info!("Dropped unavailable items from cart of {customer_id}");
        save_cart(db, customer_id, &cart).await?;
    }

    Ok((cart, resolved))
}

pub fn subtotal(lines: &[(Product, u32)]) -> u64 {
    lines
        .iter()
        .map(|(product, quantity)| product.price * *quantity as u64)
        .sum()
}

async fn cart_view(db: &Db, customer_id: &str) -> Result<CartView, AppError> {
    let (cart, resolved) = resolve_cart(db, customer_id).await?;
    let subtotal = subtotal(&resolved);

    let mut lines = Vec::with_capacity(resolved.len());
    for (product, quantity) in resolved {
        let line_total = product.price * quantity as u64;
        lines.push(CartLineView {
            product: product_view(db, product).await?,
            quantity,
            line_total,
        });
    }

    Ok(CartView {
        lines,
        subtotal,
        item_count: cart.item_count(),
    })
}

pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(cart_view(&state.db, &customer.id).await?))
}

#[derive(Deserialize, Debug)]
pub struct AddItem {
    pub product_id: String,
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

#[derive(Deserialize, Debug)]
pub struct SetQuantity {
    pub quantity: u32,
}

async fn ensure_stock(db: &Db, product: &Product, wanted: u32) -> Result<(), AppError> {
    let stock = db.count(STOCK, &product.id).await?;
    if wanted as u64 > stock {
        return Err(AppError::Conflict(format!(
            "Only {stock} of {} left",
            product.name
        )));
    }

    Ok(())
}

pub async fn add_item(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
    Json(input): Json<AddItem>,
) -> Result<impl IntoResponse, AppError> {
    let product = active_product(&state.db, &input.product_id).await?;
    let mut cart = load_cart(&state.db, &customer.id).await?;

    let in_cart = cart.line(&product.id).map_or(0, |line| line.quantity);
    ensure_stock(&state.db, &product, in_cart.saturating_add(input.quantity)).await?;

    cart.apply(CartAction::Add {
        product_id: product.id.clone(),
        sku: product.sku.clone(),
        quantity: input.quantity,
    })?;
    save_cart(&state.db, &customer.id, &cart).await?;

    Ok(Json(cart_view(&state.db, &customer.id).await?))
}

pub async fn set_quantity(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
    Path(product_id): Path<String>,
    Json(input): Json<SetQuantity>,
) -> Result<impl IntoResponse, AppError> {
    let mut cart = load_cart(&state.db, &customer.id).await?;

    let product_id = if input.quantity > 0 {
        let product = active_product(&state.db, &product_id).await?;
        ensure_stock(&state.db, &product, input.quantity).await?;
        product.id
    } else {
        // Hidden or deleted products can still be dropped from the cart
        find_product(&state.db, &product_id)
            .await?
            .map_or(product_id, |product| product.id)
    };

    cart.apply(CartAction::SetQuantity {
        product_id,
        quantity: input.quantity,
    })?;
    save_cart(&state.db, &customer.id, &cart).await?;

    Ok(Json(cart_view(&state.db, &customer.id).await?))
}

pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
    Path(product_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut cart = load_cart(&state.db, &customer.id).await?;

    cart.apply(CartAction::Remove { product_id })?;
    save_cart(&state.db, &customer.id, &cart).await?;

    Ok(Json(cart_view(&state.db, &customer.id).await?))
}

pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let mut cart = load_cart(&state.db, &customer.id).await?;

    cart.apply(CartAction::Clear)?;
    save_cart(&state.db, &customer.id, &cart).await?;

    Ok(Json(cart_view(&state.db, &customer.id).await?))
}
