use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use shop::{
    models::{DiscountKind, Voucher, new_id},
    pricing::{calc_voucher_discount, validate_voucher_value},
    utils::normalize_code,
};
use tracing::info;

use crate::{
    auth::{AdminUser, AuthUser},
    error::AppError,
    routes::cart::{resolve_cart, subtotal},
    state::AppState,
    store::{
        Db,
        collections::{CUSTOMERS, VOUCHERS},
        counters::VOUCHER_USES,
        indexes::VOUCHER_CODE,
    },
};

/// Voucher with `used_count` read from its counter.
pub async fn with_usage(db: &Db, mut voucher: Voucher) -> Result<Voucher, AppError> {
    voucher.used_count = db.count(VOUCHER_USES, &voucher.id).await?;

    Ok(voucher)
}

pub async fn find_voucher(db: &Db, code: &str) -> Result<Voucher, AppError> {
    let voucher: Voucher = db
        .find_by_index(VOUCHER_CODE, &normalize_code(code), VOUCHERS)
        .await?
        .ok_or(AppError::NotFound("Voucher"))?;

    with_usage(db, voucher).await
}

#[derive(Deserialize, Debug)]
pub struct ValidateInput {
    pub code: String,
}

#[derive(Serialize, Debug)]
pub struct VoucherPreview {
    pub code: String,
    pub kind: DiscountKind,
    pub value: u64,
    pub subtotal: u64,
    pub discount: u64,
}

pub async fn validate_voucher(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
    Json(input): Json<ValidateInput>,
) -> Result<impl IntoResponse, AppError> {
    let voucher = find_voucher(&state.db, &input.code).await?;
    let (_, lines) = resolve_cart(&state.db, &customer.id).await?;
    let subtotal = subtotal(&lines);

    let discount = calc_voucher_discount(&voucher, subtotal, &customer.id, Utc::now())?;

    Ok(Json(VoucherPreview {
        code: voucher.code,
        kind: voucher.kind,
        value: voucher.value,
        subtotal,
        discount,
    }))
}

pub async fn list_vouchers(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
) -> Result<impl IntoResponse, AppError> {
    let mut vouchers = Vec::new();
    for voucher in state.db.load_all::<Voucher>(VOUCHERS).await? {
        vouchers.push(with_usage(&state.db, voucher).await?);
    }

    vouchers.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(vouchers))
}

#[derive(Deserialize, Debug)]
pub struct VoucherInput {
    pub code: String,
    pub kind: DiscountKind,
    pub value: u64,
    #[serde(default)]
    pub min_order_value: u64,
    pub max_discount: Option<u64>,
    pub usage_limit: Option<u64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub active: bool,
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub description: String,
}

fn default_active() -> bool {
    true
}

fn check_window(
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), AppError> {
    if let (Some(start), Some(end)) = (starts_at, expires_at) {
        if end <= start {
            return Err(AppError::MalformedPayload(
                "expires_at must be after starts_at".to_string(),
            ));
        }
    }

    Ok(())
}

async fn check_assignee(db: &Db, assigned_to: Option<&str>) -> Result<(), AppError> {
    if let Some(customer_id) = assigned_to {
        if db.store().fetch(CUSTOMERS, customer_id).await?.is_none() {
            return Err(AppError::NotFound("Customer"));
        }
    }

    Ok(())
}

pub async fn create_voucher(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Json(input): Json<VoucherInput>,
) -> Result<impl IntoResponse, AppError> {
    let code = normalize_code(&input.code);
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(AppError::MalformedPayload(format!("invalid voucher code {code:?}")));
    }

    validate_voucher_value(input.kind, input.value)?;
    check_window(input.starts_at, input.expires_at)?;
    check_assignee(&state.db, input.assigned_to.as_deref()).await?;

    let id = new_id();
    if !state.db.store().claim_index(VOUCHER_CODE, &code, &id).await? {
        return Err(AppError::Conflict(format!("voucher {code} already exists")));
    }

    let voucher = Voucher {
        id,
        code,
        kind: input.kind,
        value: input.value,
        min_order_value: input.min_order_value,
        max_discount: input.max_discount,
        usage_limit: input.usage_limit,
        used_count: 0,
        starts_at: input.starts_at,
        expires_at: input.expires_at,
        active: input.active,
        assigned_to: input.assigned_to,
        description: input.description.trim().to_string(),
        created_at: Utc::now(),
    };

    state.db.save(VOUCHERS, &voucher.id, &voucher).await?;
    info!("Created voucher {}", voucher.code);

    Ok((StatusCode::CREATED, Json(voucher)))
}

/// Absent keeps the field, `null` clears it.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, Debug, Default)]
pub struct VoucherPatch {
    pub kind: Option<DiscountKind>,
    pub value: Option<u64>,
    pub min_order_value: Option<u64>,
    #[serde(default, deserialize_with = "nullable")]
    pub max_discount: Option<Option<u64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub usage_limit: Option<Option<u64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub starts_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub active: Option<bool>,
    pub description: Option<String>,
}

pub async fn update_voucher(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(id): Path<String>,
    Json(patch): Json<VoucherPatch>,
) -> Result<impl IntoResponse, AppError> {
    let mut voucher: Voucher = state
        .db
        .load(VOUCHERS, &id)
        .await?
        .ok_or(AppError::NotFound("Voucher"))?;

    if let Some(kind) = patch.kind {
        voucher.kind = kind;
    }
    if let Some(value) = patch.value {
        voucher.value = value;
    }
    if let Some(min_order_value) = patch.min_order_value {
        voucher.min_order_value = min_order_value;
    }
    if let Some(max_discount) = patch.max_discount {
        voucher.max_discount = max_discount;
    }
    if let Some(usage_limit) = patch.usage_limit {
        voucher.usage_limit = usage_limit;
    }
    if let Some(starts_at) = patch.starts_at {
        voucher.starts_at = starts_at;
    }
    if let Some(expires_at) = patch.expires_at {
        voucher.expires_at = expires_at;
    }
    if let Some(active) = patch.active {
        voucher.active = active;
    }
    if let Some(description) = patch.description {
        voucher.description = description.trim().to_string();
    }

    validate_voucher_value(voucher.kind, voucher.value)?;
    check_window(voucher.starts_at, voucher.expires_at)?;

    state.db.save(VOUCHERS, &voucher.id, &voucher).await?;

    Ok(Json(with_usage(&state.db, voucher).await?))
}

pub async fn delete_voucher(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let voucher: Voucher = state
        .db
        .load(VOUCHERS, &id)
        .await?
        .ok_or(AppError::NotFound("Voucher"))?;

    state.db.delete(VOUCHERS, &voucher.id).await?;
    state.db.store().release_index(VOUCHER_CODE, &voucher.code).await?;

    info!("Deleted voucher {}", voucher.code);

    Ok(StatusCode::NO_CONTENT)
}
