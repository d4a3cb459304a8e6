use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use server::{
    build_router, config::Config, memory::MemoryStore, seed::ensure_admin, state::AppState,
};
use tokio::net::TcpListener;

const ADMIN_EMAIL: &str = "owner@brew.vn";
const ADMIN_PASSWORD: &str = "roast-master-1";

struct Shop {
    base: String,
    client: Client,
}

impl Shop {
    async fn start() -> Self {
        let config = Config {
            bcrypt_cost: 4,
            admin_email: Some(ADMIN_EMAIL.to_string()),
            admin_password: Some(ADMIN_PASSWORD.to_string()),
            ..Default::default()
        };
        let state = AppState::with_store(config, Arc::new(MemoryStore::default()));
        ensure_admin(&state.db, &state.config).await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });

        Self {
            base: format!("http://{address}/api"),
            client: Client::new(),
        }
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = self.client.request(method, format!("{}{path}", self.base));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.unwrap();
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);

        (status, body)
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(reqwest::Method::GET, path, token, None).await
    }

    async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, token, Some(body)).await
    }

    async fn put(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::PUT, path, token, Some(body)).await
    }

    async fn register(&self, email: &str) -> String {
        let (status, body) = self
            .post(
                "/auth/register",
                None,
                json!({ "email": email, "password": "flat-white-9", "name": "An" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        body["token"].as_str().unwrap().to_string()
    }

    async fn admin(&self) -> String {
        let (status, body) = self
            .post(
                "/auth/login",
                None,
                json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        body["token"].as_str().unwrap().to_string()
    }

    async fn product(&self, admin: &str, sku: &str, price: u64, stock: u64) -> String {
        let (status, body) = self
            .post(
                "/admin/products",
                Some(admin),
                json!({
                    "sku": sku,
                    "name": format!("Drink {sku}"),
                    "category": "Coffee",
                    "price": price,
                    "stock": stock,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        body["id"].as_str().unwrap().to_string()
    }

    async fn add_to_cart(&self, token: &str, product_id: &str, quantity: u32) {
        let (status, body) = self
            .post(
                "/cart/items",
                Some(token),
                json!({ "product_id": product_id, "quantity": quantity }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    async fn stock(&self, product_id: &str) -> u64 {
        let (_, body) = self.get(&format!("/products/{product_id}"), None).await;

        body["stock"].as_u64().unwrap()
    }
}

fn checkout(voucher: Option<&str>, redeem_points: u64) -> Value {
    json!({
        "shipping": { "name": "An", "phone": "0912 345 678", "address": "12 Nguyen Hue, Q1" },
        "payment_method": "cod",
        "voucher_code": voucher,
        "redeem_points": redeem_points,
    })
}

#[tokio::test]
async fn test_auth_and_roles() {
    let shop = Shop::start().await;
    let token = shop.register("An@Brew.vn").await;

    let (status, _) = shop
        .post(
            "/auth/register",
            None,
            json!({ "email": "an@brew.vn", "password": "flat-white-9", "name": "Again" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = shop
        .post(
            "/auth/login",
            None,
            json!({ "email": "an@brew.vn", "password": "wrong-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, me) = shop.get("/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "an@brew.vn");
    assert_eq!(me["loyalty_points"], 0);
    assert!(me.get("password_hash").is_none());

    let (status, _) = shop.get("/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = shop.get("/admin/stats", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = shop.admin().await;
    let (status, _) = shop.get("/admin/stats", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_checkout_with_voucher_and_points() {
    let shop = Shop::start().await;
    let admin = shop.admin().await;
    let token = shop.register("binh@brew.vn").await;

    let latte = shop.product(&admin, "CF-LATTE", 150_000, 5).await;

    let (status, body) = shop
        .post(
            "/admin/vouchers",
            Some(&admin),
            json!({
                "code": "latte10",
                "kind": "percentage",
                "value": 10,
                "max_discount": 20_000,
                "usage_limit": 1,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (_, me) = shop.get("/auth/me", Some(&token)).await;
    let customer_id = me["id"].as_str().unwrap().to_string();
    let (status, _) = shop
        .post(
            &format!("/admin/customers/{customer_id}/points"),
            Some(&admin),
            json!({ "delta": 30, "note": "welcome" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    shop.add_to_cart(&token, &latte, 2).await;

    let (status, preview) = shop
        .post("/vouchers/validate", Some(&token), json!({ "code": "LATTE10" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["discount"], 20_000);

    let (status, order) = shop
        .post("/orders", Some(&token), checkout(Some("latte10"), 30))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["status"], "pending");
    assert_eq!(order["quote"]["subtotal"], 300_000);
    assert_eq!(order["quote"]["voucher_discount"], 20_000);
    assert_eq!(order["quote"]["points_discount"], 30_000);
    assert_eq!(order["quote"]["shipping_fee"], 0);
    assert_eq!(order["quote"]["total"], 250_000);
    assert_eq!(order["quote"]["points_earned"], 25);

    assert_eq!(shop.stock(&latte).await, 3);

    let (_, cart) = shop.get("/cart", Some(&token)).await;
    assert_eq!(cart["item_count"], 0);

    // The single voucher use is gone
    shop.add_to_cart(&token, &latte, 1).await;
    let (status, _) = shop
        .post("/orders", Some(&token), checkout(Some("LATTE10"), 0))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(shop.stock(&latte).await, 3);

    let order_id = order["id"].as_str().unwrap();
    for next in ["confirmed", "shipping", "delivered"] {
        let (status, body) = shop
            .put(
                &format!("/admin/orders/{order_id}/status"),
                Some(&admin),
                json!({ "status": next }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let (status, _) = shop
        .put(
            &format!("/admin/orders/{order_id}/status"),
            Some(&admin),
            json!({ "status": "cancelled" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, loyalty) = shop.get("/loyalty", Some(&token)).await;
    assert_eq!(loyalty["balance"], 25);
    assert_eq!(loyalty["history"].as_array().unwrap().len(), 3);

    let (_, stats) = shop.get("/admin/stats", Some(&admin)).await;
    assert_eq!(stats["revenue"], 250_000);
    assert_eq!(stats["orders_by_status"]["delivered"], 1);
    assert_eq!(stats["top_products"][0]["units"], 2);
    assert_eq!(stats["low_stock"][0]["stock"], 3);
}

#[tokio::test]
async fn test_last_unit_goes_to_one_customer() {
    let shop = Shop::start().await;
    let admin = shop.admin().await;
    let first = shop.register("chi@brew.vn").await;
    let second = shop.register("dung@brew.vn").await;

    let beans = shop.product(&admin, "BN-ARABICA", 220_000, 1).await;
    shop.add_to_cart(&first, &beans, 1).await;
    shop.add_to_cart(&second, &beans, 1).await;

    let (status, order) = shop.post("/orders", Some(&first), checkout(None, 0)).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["quote"]["shipping_fee"], 30_000);
    assert_eq!(order["quote"]["total"], 250_000);

    let (status, _) = shop.post("/orders", Some(&second), checkout(None, 0)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(shop.stock(&beans).await, 0);

    let (_, cart) = shop.get("/cart", Some(&second)).await;
    assert_eq!(cart["item_count"], 1);

    let order_id = order["id"].as_str().unwrap();

    let (status, _) = shop
        .post(&format!("/orders/{order_id}/cancel"), Some(&second), json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, cancelled) = shop
        .post(&format!("/orders/{order_id}/cancel"), Some(&first), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(shop.stock(&beans).await, 1);

    let (status, _) = shop
        .post(&format!("/orders/{order_id}/cancel"), Some(&first), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(shop.stock(&beans).await, 1);

    let (status, order) = shop.post("/orders", Some(&second), checkout(None, 0)).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
}

#[tokio::test]
async fn test_catalog_browsing() {
    let shop = Shop::start().await;
    let admin = shop.admin().await;

    let cheap = shop.product(&admin, "CF-DEN", 25_000, 10).await;
    shop.product(&admin, "CF-SUA", 29_000, 10).await;

    let (status, _) = shop
        .post(
            "/admin/products",
            Some(&admin),
            json!({ "sku": "cf-den", "name": "Dup", "category": "Coffee", "price": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, page) = shop.get("/products?sort=price_desc", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"][0]["sku"], "CF-SUA");

    let (_, page) = shop.get("/products?max_price=26000", None).await;
    assert_eq!(page["total"], 1);

    let (_, categories) = shop.get("/categories", None).await;
    assert_eq!(categories[0]["name"], "Coffee");
    assert_eq!(categories[0]["count"], 2);

    let (status, _) = shop
        .put(
            &format!("/admin/products/{cheap}"),
            Some(&admin),
            json!({ "active": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = shop.get(&format!("/products/{cheap}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, page) = shop.get("/products", None).await;
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn test_reviews_replace_and_rerate() {
    let shop = Shop::start().await;
    let admin = shop.admin().await;
    let first = shop.register("em@brew.vn").await;
    let second = shop.register("giang@brew.vn").await;

    let mocha = shop.product(&admin, "CF-MOCHA", 55_000, 10).await;
    let path = format!("/products/{mocha}/reviews");

    let (status, _) = shop.post(&path, None, json!({ "rating": 5 })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = shop.post(&path, Some(&first), json!({ "rating": 6 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, review) = shop
        .post(&path, Some(&first), json!({ "rating": 2, "comment": "too sweet" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{review}");
    let (status, _) = shop.post(&path, Some(&second), json!({ "rating": 4 })).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, again) = shop
        .post(&path, Some(&first), json!({ "rating": 5, "comment": "grew on me" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(again["id"], review["id"]);

    let (_, reviews) = shop.get(&path, None).await;
    let reviews = reviews.as_array().unwrap();
    assert_eq!(reviews.len(), 2);
    assert!(reviews.iter().any(|review| review["comment"] == "grew on me"));
    assert!(!reviews.iter().any(|review| review["comment"] == "too sweet"));

    let (_, product) = shop.get(&format!("/products/{mocha}"), None).await;
    assert_eq!(product["rating"]["count"], 2);
    assert_eq!(product["rating"]["average"], 4.5);
}

#[tokio::test]
async fn test_cart_respects_stock_and_visibility() {
    let shop = Shop::start().await;
    let admin = shop.admin().await;
    let token = shop.register("hoa@brew.vn").await;

    let tea = shop.product(&admin, "TE-OOLONG", 40_000, 3).await;
    let hidden = shop.product(&admin, "TE-SEN", 40_000, 3).await;

    shop.add_to_cart(&token, &tea, 2).await;
    let (status, _) = shop
        .post("/cart/items", Some(&token), json!({ "product_id": tea, "quantity": 2 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = shop
        .put(&format!("/cart/items/{tea}"), Some(&token), json!({ "quantity": 4 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = shop
        .put(
            &format!("/admin/products/{hidden}"),
            Some(&admin),
            json!({ "active": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = shop
        .post("/cart/items", Some(&token), json!({ "product_id": hidden, "quantity": 1 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = shop
        .post("/cart/items", Some(&token), json!({ "product_id": "no-such-drink", "quantity": 1 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, cart) = shop.get("/cart", Some(&token)).await;
    assert_eq!(cart["item_count"], 2);
    assert_eq!(cart["subtotal"], 80_000);
}

#[tokio::test]
async fn test_personal_voucher_only_for_assignee() {
    let shop = Shop::start().await;
    let admin = shop.admin().await;
    let owner = shop.register("khanh@brew.vn").await;
    let other = shop.register("linh@brew.vn").await;

    let latte = shop.product(&admin, "CF-LATTE", 60_000, 10).await;
    shop.add_to_cart(&owner, &latte, 1).await;
    shop.add_to_cart(&other, &latte, 1).await;

    let (_, me) = shop.get("/auth/me", Some(&owner)).await;
    let owner_id = me["id"].as_str().unwrap().to_string();

    let (status, body) = shop
        .post(
            "/admin/vouchers",
            Some(&admin),
            json!({
                "code": "birthday",
                "kind": "fixed",
                "value": 15_000,
                "assigned_to": owner_id,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, _) = shop
        .post("/vouchers/validate", Some(&other), json!({ "code": "BIRTHDAY" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = shop
        .post("/orders", Some(&other), checkout(Some("birthday"), 0))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, preview) = shop
        .post("/vouchers/validate", Some(&owner), json!({ "code": "BIRTHDAY" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(preview["discount"], 15_000);

    let (status, _) = shop
        .post(
            "/admin/vouchers",
            Some(&admin),
            json!({
                "code": "ghost",
                "kind": "fixed",
                "value": 5_000,
                "assigned_to": "no-such-customer",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_products_by_slug() {
    let shop = Shop::start().await;
    let admin = shop.admin().await;
    let token = shop.register("minh@brew.vn").await;

    let id = shop.product(&admin, "CF-COLD", 45_000, 5).await;
    let (_, product) = shop.get(&format!("/products/{id}"), None).await;
    let slug = product["slug"].as_str().unwrap().to_string();
    assert_ne!(slug, id);

    let (status, by_slug) = shop.get(&format!("/products/{slug}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_slug["id"], id.as_str());

    shop.add_to_cart(&token, &id, 1).await;
    let (status, cart) = shop
        .put(&format!("/cart/items/{slug}"), Some(&token), json!({ "quantity": 3 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{cart}");
    assert_eq!(cart["lines"].as_array().unwrap().len(), 1);
    assert_eq!(cart["item_count"], 3);

    let (status, cart) = shop
        .put(&format!("/cart/items/{slug}"), Some(&token), json!({ "quantity": 0 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["item_count"], 0);
}

#[tokio::test]
async fn test_rejected_product_update_keeps_keys() {
    let shop = Shop::start().await;
    let admin = shop.admin().await;

    let id = shop.product(&admin, "CF-AAA", 30_000, 5).await;

    let (status, _) = shop
        .put(
            &format!("/admin/products/{id}"),
            Some(&admin),
            json!({ "sku": "CF-BBB", "price": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, product) = shop.get(&format!("/products/{id}"), None).await;
    assert_eq!(product["sku"], "CF-AAA");
    assert_eq!(product["price"], 30_000);

    let (status, _) = shop
        .post(
            "/admin/products",
            Some(&admin),
            json!({ "sku": "CF-AAA", "name": "Copy", "category": "Coffee", "price": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    shop.product(&admin, "CF-BBB", 30_000, 5).await;

    let (status, _) = shop
        .put(
            &format!("/admin/products/{id}"),
            Some(&admin),
            json!({ "sku": "CF-BBB" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, renamed) = shop
        .put(
            &format!("/admin/products/{id}"),
            Some(&admin),
            json!({ "sku": "CF-CCC" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{renamed}");

    shop.product(&admin, "CF-AAA", 30_000, 5).await;
}
