use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use shop::models::{Order, OrderStatus, Role};

use crate::{
    auth::{AdminUser, AuthUser},
    checkout::{CheckoutInput, place_order as checkout, transition},
    error::AppError,
    state::AppState,
    store::{Db, collections::ORDERS},
    utils::{Page, Pagination},
};

/// Newest first.
pub async fn orders_where(
    db: &Db,
    keep: impl Fn(&Order) -> bool,
) -> Result<Vec<Order>, AppError> {
    let mut orders: Vec<Order> = db
        .load_all::<Order>(ORDERS)
        .await?
        .into_iter()
        .filter(|order| keep(order))
        .collect();

    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(orders)
}

async fn load_order(db: &Db, id: &str) -> Result<Order, AppError> {
    db.load(ORDERS, id).await?.ok_or(AppError::NotFound("Order"))
}

pub async fn place_order(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
    Json(input): Json<CheckoutInput>,
) -> Result<impl IntoResponse, AppError> {
    let order = checkout(&state.db, &customer.id, input).await?;

    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let orders = orders_where(&state.db, |order| order.customer_id == customer.id).await?;

    Ok(Json(Page::slice(orders, pagination)))
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let order = load_order(&state.db, &id).await?;

    // Other customers' orders read as missing
    if order.customer_id != customer.id && customer.role != Role::Admin {
        return Err(AppError::NotFound("Order"));
    }

    Ok(Json(order))
}

pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let order = load_order(&state.db, &id).await?;

    if order.customer_id != customer.id {
        return Err(AppError::NotFound("Order"));
    }

    if order.status != OrderStatus::Pending {
        return Err(AppError::Conflict(
            "only pending orders can be cancelled".to_string(),
        ));
    }

    let order = transition(&state.db, order, OrderStatus::Cancelled, &customer.id).await?;

    Ok(Json(order))
}

#[derive(Deserialize, Debug)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Query(filter): Query<OrderFilter>,
) -> Result<impl IntoResponse, AppError> {
    let orders = orders_where(&state.db, |order| {
        filter.status.is_none_or(|status| order.status == status)
    })
    .await?;

    let pagination = Pagination {
        page: filter.page,
        per_page: filter.per_page,
    };

    Ok(Json(Page::slice(orders, pagination)))
}

#[derive(Deserialize, Debug)]
pub struct StatusInput {
    pub status: OrderStatus,
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(input): Json<StatusInput>,
) -> Result<impl IntoResponse, AppError> {
    let order = load_order(&state.db, &id).await?;
    let order = transition(&state.db, order, input.status, &admin.id).await?;

    Ok(Json(order))
}
