use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shop::{
    models::{Customer, Role, new_id},
    utils::normalize_email,
};
use tracing::{info, warn};

use crate::{
    auth::{AuthUser, check_password_strength, hash_password, issue_token, verify_password},
    error::AppError,
    loyalty,
    state::AppState,
    store::{Db, collections::CUSTOMERS, indexes::CUSTOMER_EMAIL},
    utils::non_empty,
};

/// Customer without the password hash, with the loyalty balance joined in.
#[derive(Serialize, Debug)]
pub struct CustomerView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub active: bool,
    pub loyalty_points: u64,
    pub created_at: DateTime<Utc>,
}

pub async fn customer_view(db: &Db, customer: Customer) -> Result<CustomerView, AppError> {
    let loyalty_points = loyalty::balance(db, &customer.id).await?;

    Ok(CustomerView {
        id: customer.id,
        email: customer.email,
        name: customer.name,
        phone: customer.phone,
        role: customer.role,
        active: customer.active,
        loyalty_points,
        created_at: customer.created_at,
    })
}

#[derive(Serialize, Debug)]
pub struct Session {
    pub token: String,
    pub customer: CustomerView,
}

#[derive(Deserialize, Debug)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

fn validate_email(email: &str) -> Result<String, AppError> {
    let email = normalize_email(email);

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::MalformedPayload(format!("invalid email {email:?}"))),
    }
}

fn clean_phone(phone: Option<String>) -> Option<String> {
    phone
        .map(|phone| phone.trim().to_string())
        .filter(|phone| !phone.is_empty())
}

/// Creates a customer and claims the email. Also used to bootstrap the admin account.
pub async fn insert_customer(
    db: &Db,
    bcrypt_cost: u32,
    input: RegisterInput,
    role: Role,
) -> Result<Customer, AppError> {
    let email = validate_email(&input.email)?;
    let name = non_empty("name", &input.name)?;
    check_password_strength(&input.password)?;

    let id = new_id();
    if !db.store().claim_index(CUSTOMER_EMAIL, &email, &id).await? {
        return Err(AppError::Conflict("email is already registered".to_string()));
    }

    let password_hash = match hash_password(input.password, bcrypt_cost).await {
        Ok(hash) => hash,
        Err(e) => {
            db.store().release_index(CUSTOMER_EMAIL, &email).await?;
            return Err(e);
        }
    };

    let customer = Customer {
        id,
        email,
        name,
        phone: clean_phone(input.phone),
        password_hash,
        role,
        active: true,
        created_at: Utc::now(),
    };

    db.save(CUSTOMERS, &customer.id, &customer).await?;
    info!("Registered {} as {:?}", customer.email, customer.role);

    Ok(customer)
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RegisterInput>,
) -> Result<impl IntoResponse, AppError> {
    let customer =
        insert_customer(&state.db, state.config.bcrypt_cost, input, Role::Customer).await?;
    let token = issue_token(&state, &customer)?;

    Ok((
        StatusCode::CREATED,
        Json(Session {
            token,
            customer: customer_view(&state.db, customer).await?,
        }),
    ))
}

#[derive(Deserialize, Debug)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(input): Json<LoginInput>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&input.email);

    let Some(customer) = state
        .db
        .find_by_index::<Customer>(CUSTOMER_EMAIL, &email, CUSTOMERS)
        .await?
    else {
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(input.password, customer.password_hash.clone()).await? {
        warn!("Failed login for {email}");
        return Err(AppError::InvalidCredentials);
    }

    if !customer.active {
        return Err(AppError::Forbidden);
    }

    let token = issue_token(&state, &customer)?;

    Ok(Json(Session {
        token,
        customer: customer_view(&state.db, customer).await?,
    }))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(customer_view(&state.db, customer).await?))
}

#[derive(Deserialize, Debug)]
pub struct ProfileInput {
    pub name: Option<String>,
    pub phone: Option<String>,
}

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    AuthUser(mut customer): AuthUser,
    Json(input): Json<ProfileInput>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(name) = input.name {
        customer.name = non_empty("name", &name)?;
    }
    if input.phone.is_some() {
        customer.phone = clean_phone(input.phone);
    }

    state.db.save(CUSTOMERS, &customer.id, &customer).await?;

    Ok(Json(customer_view(&state.db, customer).await?))
}

#[derive(Deserialize, Debug)]
pub struct PasswordInput {
    pub current: String,
    pub new: String,
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    AuthUser(mut customer): AuthUser,
    Json(input): Json<PasswordInput>,
) -> Result<impl IntoResponse, AppError> {
    if !verify_password(input.current, customer.password_hash.clone()).await? {
        return Err(AppError::InvalidCredentials);
    }

    check_password_strength(&input.new)?;
    customer.password_hash = hash_password(input.new, state.config.bcrypt_cost).await?;
    state.db.save(CUSTOMERS, &customer.id, &customer).await?;

    info!("Password changed for {}", customer.email);

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert_eq!(validate_email(" An@Brew.VN ").unwrap(), "an@brew.vn");
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@brew.vn").is_err());
        assert!(validate_email("an@localhost").is_err());
    }
}
