use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use shop::{
    models::{Customer, LoyaltyEntry, LoyaltyReason},
    pricing::POINT_VALUE_VND,
};

use crate::{
    auth::{AdminUser, AuthUser},
    error::AppError,
    loyalty::{balance, credit, debit, history},
    state::AppState,
    store::collections::CUSTOMERS,
};

#[derive(Serialize, Debug)]
pub struct LoyaltySummary {
    pub balance: u64,
    /// VND per point at checkout.
    pub point_value: u64,
    pub history: Vec<LoyaltyEntry>,
}

pub async fn get_loyalty(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(LoyaltySummary {
        balance: balance(&state.db, &customer.id).await?,
        point_value: POINT_VALUE_VND,
        history: history(&state.db, &customer.id).await?,
    }))
}

#[derive(Deserialize, Debug)]
pub struct AdjustInput {
    pub delta: i64,
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn adjust_points(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(input): Json<AdjustInput>,
) -> Result<impl IntoResponse, AppError> {
    let customer: Customer = state
        .db
        .load(CUSTOMERS, &id)
        .await?
        .ok_or(AppError::NotFound("Customer"))?;

    if input.delta == 0 {
        return Err(AppError::MalformedPayload("delta must not be zero".to_string()));
    }

    let note = input
        .note
        .map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty())
        .or_else(|| Some(format!("adjusted by {}", admin.email)));

    let points = input.delta.unsigned_abs();
    let entry = if input.delta > 0 {
        credit(&state.db, &customer.id, points, LoyaltyReason::Adjusted, None, note).await?
    } else {
        let entry = debit(&state.db, &customer.id, points, LoyaltyReason::Adjusted, None, note).await?;
        if entry.is_none() {
            return Err(AppError::Conflict(format!(
                "balance is {}, cannot take {points} points",
                balance(&state.db, &customer.id).await?
            )));
        }
        entry
    };

    Ok(Json(entry))
}
