use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::State,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod cart;
pub mod loyalty;
pub mod orders;
pub mod products;
pub mod vouchers;

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "store": state.db.store().backend_tag(),
        "search": state.search.is_some(),
    }))
}

fn cors(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    if origin == "*" {
        return cors.allow_origin(Any);
    }

    match origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            warn!("Ignoring CORS_ORIGIN {origin:?}: {e}");
            cors
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let storefront = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me).put(auth::update_me))
        .route("/auth/password", put(auth::change_password))
        .route("/products", get(products::list_products))
        .route("/products/search", get(products::search_products))
        .route("/products/{id}", get(products::get_product))
        .route(
            "/products/{id}/reviews",
            get(products::list_reviews).post(products::post_review),
        )
        .route("/categories", get(products::list_categories))
        .route("/cart", get(cart::get_cart).delete(cart::clear_cart))
        .route("/cart/items", post(cart::add_item))
        .route(
            "/cart/items/{product_id}",
            put(cart::set_quantity).delete(cart::remove_item),
        )
        .route("/vouchers/validate", post(vouchers::validate_voucher))
        .route(
            "/orders",
            get(orders::list_my_orders).post(orders::place_order),
        )
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/cancel", post(orders::cancel_order))
        .route("/loyalty", get(loyalty::get_loyalty));

    let admin = Router::new()
        .route("/products", post(products::create_product))
        .route(
            "/products/{id}",
            put(products::update_product).delete(products::delete_product),
        )
        .route("/products/{id}/stock", put(products::set_stock))
        .route("/orders", get(orders::list_orders))
        .route("/orders/{id}/status", put(orders::update_status))
        .route("/customers", get(admin::list_customers))
        .route(
            "/customers/{id}",
            get(admin::get_customer).put(admin::update_customer),
        )
        .route("/customers/{id}/points", post(loyalty::adjust_points))
        .route(
            "/vouchers",
            get(vouchers::list_vouchers).post(vouchers::create_voucher),
        )
        .route(
            "/vouchers/{id}",
            put(vouchers::update_voucher).delete(vouchers::delete_voucher),
        )
        .route("/stats", get(admin::stats));

    let cors = cors(&state.config.cors_origin);

    Router::new()
        .route("/health", get(health))
        .nest("/api", storefront.nest("/admin", admin))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
