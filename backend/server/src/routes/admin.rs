//! Customer management and the dashboard numbers. Product, order, voucher and
//! points administration live next to their public counterparts.
use std::{collections::HashMap, sync::Arc};

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use shop::models::{Customer, Order, OrderStatus, Product, Role};
use tracing::info;

use crate::{
    auth::AdminUser,
    error::AppError,
    routes::auth::{CustomerView, customer_view},
    state::AppState,
    store::{
        collections::{CUSTOMERS, ORDERS, PRODUCTS},
        counters::STOCK,
    },
    utils::{Page, Pagination},
};

pub const LOW_STOCK_THRESHOLD: u64 = 5;
pub const TOP_PRODUCTS: usize = 5;

async fn load_customer(state: &AppState, id: &str) -> Result<Customer, AppError> {
    state
        .db
        .load(CUSTOMERS, id)
        .await?
        .ok_or(AppError::NotFound("Customer"))
}

pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let mut customers: Vec<Customer> = state.db.load_all(CUSTOMERS).await?;
    customers.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let page = Page::slice(customers, pagination);

    let mut items = Vec::with_capacity(page.items.len());
    for customer in page.items {
        items.push(customer_view(&state.db, customer).await?);
    }

    Ok(Json(Page {
        items,
        page: page.page,
        per_page: page.per_page,
        total: page.total,
    }))
}

#[derive(Serialize, Debug)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: CustomerView,
    pub order_count: usize,
    pub total_spent: u64,
}

pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let customer = load_customer(&state, &id).await?;

    let orders: Vec<Order> = state
        .db
        .load_all::<Order>(ORDERS)
        .await?
        .into_iter()
        .filter(|order| order.customer_id == customer.id)
        .collect();

    let total_spent = orders
        .iter()
        .filter(|order| order.status == OrderStatus::Delivered)
        .map(|order| order.quote.total)
        .sum();

    Ok(Json(CustomerDetail {
        customer: customer_view(&state.db, customer).await?,
        order_count: orders.len(),
        total_spent,
    }))
}

#[derive(Deserialize, Debug)]
pub struct CustomerPatch {
    pub role: Option<Role>,
    pub active: Option<bool>,
}

pub async fn update_customer(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(patch): Json<CustomerPatch>,
) -> Result<impl IntoResponse, AppError> {
    let mut customer = load_customer(&state, &id).await?;

    // An admin cannot lock themselves out
    if customer.id == admin.id
        && (patch.role.is_some_and(|role| role != Role::Admin) || patch.active == Some(false))
    {
        return Err(AppError::Conflict(
            "cannot demote or deactivate your own account".to_string(),
        ));
    }

    if let Some(role) = patch.role {
        customer.role = role;
    }
    if let Some(active) = patch.active {
        customer.active = active;
    }

    state.db.save(CUSTOMERS, &customer.id, &customer).await?;
    info!(
        "{} set {} to {:?}, active={}",
        admin.email, customer.email, customer.role, customer.active
    );

    Ok(Json(customer_view(&state.db, customer).await?))
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct TopProduct {
    pub product_id: String,
    pub name: String,
    pub units: u64,
    pub revenue: u64,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct LowStock {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub stock: u64,
}

#[derive(Serialize, Debug)]
pub struct Stats {
    pub revenue: u64,
    pub orders_by_status: HashMap<OrderStatus, usize>,
    pub customer_count: usize,
    pub top_products: Vec<TopProduct>,
    pub low_stock: Vec<LowStock>,
}

/// Units and revenue per product over orders that were not cancelled.
fn top_products(orders: &[Order], limit: usize) -> Vec<TopProduct> {
    let mut totals: HashMap<&str, TopProduct> = HashMap::new();

    for order in orders.iter().filter(|o| o.status != OrderStatus::Cancelled) {
        for item in &order.items {
            let entry = totals.entry(&item.product_id).or_insert_with(|| TopProduct {
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                units: 0,
                revenue: 0,
            });
            entry.units += item.quantity as u64;
            entry.revenue += item.line_total;
        }
    }

    let mut top: Vec<TopProduct> = totals.into_values().collect();
    top.sort_by(|a, b| b.units.cmp(&a.units).then_with(|| a.name.cmp(&b.name)));
    top.truncate(limit);

    top
}

fn low_stock(products: &[Product], stock: &HashMap<String, i64>) -> Vec<LowStock> {
    let mut low: Vec<LowStock> = products
        .iter()
        .filter(|product| product.active)
        .map(|product| LowStock {
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            stock: stock.get(&product.id).copied().unwrap_or(0).max(0) as u64,
        })
        .filter(|entry| entry.stock <= LOW_STOCK_THRESHOLD)
        .collect();

    low.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.sku.cmp(&b.sku)));

    low
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
) -> Result<impl IntoResponse, AppError> {
    let orders: Vec<Order> = state.db.load_all(ORDERS).await?;
    let products: Vec<Product> = state.db.load_all(PRODUCTS).await?;
    let customer_count = state.db.store().fetch_all(CUSTOMERS).await?.len();
    let stock = state.db.store().counters(STOCK).await?;

    let mut orders_by_status: HashMap<OrderStatus, usize> =
        OrderStatus::ALL.iter().map(|status| (*status, 0)).collect();
    for order in &orders {
        *orders_by_status.entry(order.status).or_default() += 1;
    }

    let revenue = orders
        .iter()
        .filter(|order| order.status == OrderStatus::Delivered)
        .map(|order| order.quote.total)
        .sum();

    Ok(Json(Stats {
        revenue,
        orders_by_status,
        customer_count,
        top_products: top_products(&orders, TOP_PRODUCTS),
        low_stock: low_stock(&products, &stock),
    }))
}
