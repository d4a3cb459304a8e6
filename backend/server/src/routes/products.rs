use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shop::{
    models::{Product, Rating, Review, new_id},
    utils::{is_valid_sku, normalize_sku, sanitize, slugify},
};
use tracing::{info, warn};

use crate::{
    auth::{AdminUser, AuthUser},
    error::AppError,
    state::AppState,
    store::{
        Db,
        collections::{PRODUCTS, REVIEWS},
        counters::STOCK,
        indexes::{PRODUCT_SKU, PRODUCT_SLUG, REVIEW_AUTHOR},
    },
    utils::{Page, Pagination, non_empty},
};

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_COMMENT_LEN: usize = 2_000;

#[derive(Serialize, Debug)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub stock: u64,
    pub in_stock: bool,
}

pub async fn product_view(db: &Db, product: Product) -> Result<ProductView, AppError> {
    let stock = db.count(STOCK, &product.id).await?;

    Ok(ProductView {
        product,
        stock,
        in_stock: stock > 0,
    })
}

pub async fn product_views(db: &Db, page: Page<Product>) -> Result<Page<ProductView>, AppError> {
    let mut items = Vec::with_capacity(page.items.len());
    for product in page.items {
        items.push(product_view(db, product).await?);
    }

    Ok(Page {
        items,
        page: page.page,
        per_page: page.per_page,
        total: page.total,
    })
}

#[derive(Deserialize, Debug, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Rating,
    Name,
}

impl SortOrder {
    /// Meilisearch sort rule, see `search::init_settings` for the sortable fields.
    pub fn search_rule(self) -> &'static str {
        match self {
            SortOrder::Newest => "created_at:desc",
            SortOrder::PriceAsc => "price:asc",
            SortOrder::PriceDesc => "price:desc",
            SortOrder::Rating => "rating:desc",
            SortOrder::Name => "name:asc",
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub q: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub sort: Option<SortOrder>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl ProductQuery {
    fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }

    fn matches(&self, product: &Product) -> bool {
        if !product.active {
            return false;
        }

        if let Some(category) = self.category.as_deref() {
            if sanitize(category) != sanitize(&product.category) {
                return false;
            }
        }

        if self.min_price.is_some_and(|min| product.price < min)
            || self.max_price.is_some_and(|max| product.price > max)
        {
            return false;
        }

        match self.q.as_deref().map(sanitize) {
            Some(q) if !q.is_empty() => {
                sanitize(&product.name).contains(&q)
                    || sanitize(&product.description).contains(&q)
                    || product.tags.iter().any(|tag| sanitize(tag).contains(&q))
                    || product.sku.eq_ignore_ascii_case(&q)
            }
            _ => true,
        }
    }
}

pub fn sort_products(products: &mut [Product], sort: SortOrder) {
    match sort {
        SortOrder::Newest => products.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::PriceAsc => products.sort_by(|a, b| a.price.cmp(&b.price).then(a.name.cmp(&b.name))),
        SortOrder::PriceDesc => products.sort_by(|a, b| b.price.cmp(&a.price).then(a.name.cmp(&b.name))),
        SortOrder::Rating => products.sort_by(|a, b| {
            b.rating
                .average
                .total_cmp(&a.rating.average)
                .then(b.rating.count.cmp(&a.rating.count))
        }),
        SortOrder::Name => products.sort_by_key(|p| p.name.to_lowercase()),
    }
}

async fn filter_products(db: &Db, query: &ProductQuery) -> Result<Page<Product>, AppError> {
    let mut products: Vec<Product> = db
        .load_all::<Product>(PRODUCTS)
        .await?
        .into_iter()
        .filter(|product| query.matches(product))
        .collect();

    sort_products(&mut products, query.sort.unwrap_or_default());

    Ok(Page::slice(products, query.pagination()))
}

pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = filter_products(&state.db, &query).await?;

    Ok(Json(product_views(&state.db, page).await?))
}

/// The index may lag behind deletes and deactivations, hits that did not survive
/// the store lookup come off the total too.
fn visible_total(total: usize, found: usize, kept: usize) -> usize {
    total.saturating_sub(found.saturating_sub(kept))
}

pub async fn search_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
) -> Result<impl IntoResponse, AppError> {
    let text = query.q.as_deref().unwrap_or_default().trim();

    if let Some(search) = &state.search {
        let pagination = query.pagination();
        let (page, per_page) = pagination.resolve();

        let sort = query.sort.map(SortOrder::search_rule);

        match search
            .search(text, query.category.as_deref(), sort, pagination.offset(), per_page)
            .await
        {
            Ok(hits) => {
                let found = hits.ids.len();
                let items: Vec<Product> = state
                    .db
                    .load_many::<Product>(PRODUCTS, &hits.ids)
                    .await?
                    .into_iter()
                    .filter(|p| p.active)
                    .collect();

                let page = Page {
                    total: visible_total(hits.total, found, items.len()),
                    items,
                    page,
                    per_page,
                };

                return Ok(Json(product_views(&state.db, page).await?));
            }
            Err(e) => warn!("Search failed, falling back to store filtering: {e}"),
        }
    }

    let page = filter_products(&state.db, &query).await?;

    Ok(Json(product_views(&state.db, page).await?))
}

/// Looks up by id, then by slug.
pub async fn find_product(db: &Db, id_or_slug: &str) -> Result<Option<Product>, AppError> {
    if let Some(product) = db.load(PRODUCTS, id_or_slug).await? {
        return Ok(Some(product));
    }

    Ok(db
        .find_by_index(PRODUCT_SLUG, &id_or_slug.to_lowercase(), PRODUCTS)
        .await?)
}

pub async fn active_product(db: &Db, id_or_slug: &str) -> Result<Product, AppError> {
    find_product(db, id_or_slug)
        .await?
        .filter(|product| product.active)
        .ok_or(AppError::NotFound("Product"))
}

pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let product = active_product(&state.db, &id).await?;

    Ok(Json(product_view(&state.db, product).await?))
}

#[derive(Serialize, Debug)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for product in state.db.load_all::<Product>(PRODUCTS).await? {
        if product.active {
            *counts.entry(product.category).or_default() += 1;
        }
    }

    let categories: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(name, count)| CategoryCount { name, count })
        .collect();

    Ok(Json(categories))
}

pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let product = active_product(&state.db, &id).await?;

    Ok(Json(product_reviews(&state.db, &product.id).await?))
}

async fn product_reviews(db: &Db, product_id: &str) -> Result<Vec<Review>, AppError> {
    let mut reviews: Vec<Review> = db
        .load_all::<Review>(REVIEWS)
        .await?
        .into_iter()
        .filter(|review| review.product_id == product_id)
        .collect();

    reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(reviews)
}

#[derive(Deserialize, Debug)]
pub struct ReviewInput {
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

/// One review per customer and product, posting again replaces it.
pub async fn post_review(
    State(state): State<Arc<AppState>>,
    AuthUser(customer): AuthUser,
    Path(id): Path<String>,
    Json(input): Json<ReviewInput>,
) -> Result<impl IntoResponse, AppError> {
    if !(1..=5).contains(&input.rating) {
        return Err(AppError::MalformedPayload("rating must be between 1 and 5".to_string()));
    }

    let comment = input.comment.trim().to_string();
    if comment.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::MalformedPayload("comment is too long".to_string()));
    }

    let mut product = active_product(&state.db, &id).await?;

    let author_key = format!("{}:{}", product.id, customer.id);
    let fresh_id = new_id();
    let review_id = if state
        .db
        .store()
        .claim_index(REVIEW_AUTHOR, &author_key, &fresh_id)
        .await?
    {
        fresh_id
    } else {
        state
            .db
            .store()
            .lookup_index(REVIEW_AUTHOR, &author_key)
            .await?
            .unwrap_or(fresh_id)
    };

    let review = Review {
        id: review_id,
        product_id: product.id.clone(),
        customer_id: customer.id.clone(),
        customer_name: customer.name.clone(),
        rating: input.rating,
        comment,
        created_at: Utc::now(),
    };
    state.db.save(REVIEWS, &review.id, &review).await?;

    let reviews = product_reviews(&state.db, &product.id).await?;
    product.rating = Rating::from_scores(reviews.iter().map(|review| review.rating));
    product.updated_at = Utc::now();
    state.db.save(PRODUCTS, &product.id, &product).await?;
    sync_search(&state, &product).await;

    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn sync_search(state: &AppState, product: &Product) {
    if let Some(search) = &state.search {
        if let Err(e) = search.upsert(product).await {
            warn!("Failed to index product {}: {e}", product.id);
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct ProductInput {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub price: u64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub stock: u64,
}

fn default_active() -> bool {
    true
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = non_empty("name", name)?;
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::MalformedPayload("name is too long".to_string()));
    }

    Ok(name)
}

fn validate_price(price: u64) -> Result<u64, AppError> {
    if price == 0 {
        return Err(AppError::MalformedPayload("price must be positive".to_string()));
    }

    Ok(price)
}

/// Claims the first free slug among `base`, `base-sku` and `sku`.
async fn claim_slug(db: &Db, base: &str, sku: &str, id: &str) -> Result<String, AppError> {
    let sku_slug = slugify(sku);
    let candidates = [
        slugify(base),
        format!("{}-{sku_slug}", slugify(base)),
        sku_slug.clone(),
    ];

    for candidate in candidates {
        let candidate = candidate.trim_matches('-').to_string();
        if candidate.is_empty() {
            continue;
        }

        if db.store().claim_index(PRODUCT_SLUG, &candidate, id).await? {
            return Ok(candidate);
        }
    }

    Err(AppError::Conflict(format!("no free slug for {sku}")))
}

/// Creates a product and its unique keys. Used by the admin API and the catalog seed.
pub async fn insert_product(db: &Db, input: ProductInput) -> Result<Product, AppError> {
    let sku = normalize_sku(&input.sku);
    if !is_valid_sku(&sku) {
        return Err(AppError::MalformedPayload(format!("invalid SKU {sku:?}")));
    }

    let name = validate_name(&input.name)?;
    let category = non_empty("category", &input.category)?;
    let price = validate_price(input.price)?;

    let id = new_id();

    if !db.store().claim_index(PRODUCT_SKU, &sku, &id).await? {
        return Err(AppError::Conflict(format!("SKU {sku} already exists")));
    }

    let slug = match claim_slug(db, input.slug.as_deref().unwrap_or(&name), &sku, &id).await {
        Ok(slug) => slug,
        Err(e) => {
            db.store().release_index(PRODUCT_SKU, &sku).await?;
            return Err(e);
        }
    };

    let now = Utc::now();
    let product = Product {
        id,
        sku,
        name,
        slug,
        description: input.description.trim().to_string(),
        category,
        price,
        images: input.images,
        tags: input.tags,
        active: input.active,
        rating: Rating::default(),
        created_at: now,
        updated_at: now,
    };

    db.save(PRODUCTS, &product.id, &product).await?;
    db.store().set_counter(STOCK, &product.id, input.stock as i64).await?;

    info!("Created product {} ({})", product.sku, product.id);

    Ok(product)
}

pub async fn create_product(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Json(input): Json<ProductInput>,
) -> Result<impl IntoResponse, AppError> {
    let product = insert_product(&state.db, input).await?;
    sync_search(&state, &product).await;

    Ok((StatusCode::CREATED, Json(product_view(&state.db, product).await?)))
}

#[derive(Deserialize, Debug, Default)]
pub struct ProductPatch {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<u64>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub active: Option<bool>,
}

pub async fn update_product(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(id): Path<String>,
    Json(patch): Json<ProductPatch>,
) -> Result<impl IntoResponse, AppError> {
    let db = &state.db;
    let mut product: Product = db
        .load(PRODUCTS, &id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    let sku = match patch.sku {
        Some(sku) => {
            let sku = normalize_sku(&sku);
            if !is_valid_sku(&sku) {
                return Err(AppError::MalformedPayload(format!("invalid SKU {sku:?}")));
            }
            sku
        }
        None => product.sku.clone(),
    };

    let slug = match patch.slug {
        Some(slug) => {
            let slug = slugify(&slug);
            if slug.is_empty() {
                return Err(AppError::MalformedPayload("slug must not be empty".to_string()));
            }
            slug
        }
        None => product.slug.clone(),
    };

    if let Some(name) = patch.name {
        product.name = validate_name(&name)?;
    }
    if let Some(description) = patch.description {
        product.description = description.trim().to_string();
    }
    if let Some(category) = patch.category {
        product.category = non_empty("category", &category)?;
    }
    if let Some(price) = patch.price {
        product.price = validate_price(price)?;
    }
    if let Some(images) = patch.images {
        product.images = images;
    }
    if let Some(tags) = patch.tags {
        product.tags = tags;
    }
    if let Some(active) = patch.active {
        product.active = active;
    }

    // Keys are claimed only once the patch is valid, old keys go only once the product is saved
    let mut claimed: Vec<(&str, String)> = Vec::new();

    if sku != product.sku {
        if !db.store().claim_index(PRODUCT_SKU, &sku, &product.id).await? {
            return Err(AppError::Conflict(format!("SKU {sku} already exists")));
        }
        claimed.push((PRODUCT_SKU, sku.clone()));
    }

    if slug != product.slug {
        let taken = match db.store().claim_index(PRODUCT_SLUG, &slug, &product.id).await {
            Ok(true) => None,
            Ok(false) => Some(AppError::Conflict(format!("slug {slug} already exists"))),
            Err(e) => Some(e.into()),
        };
        if let Some(error) = taken {
            release_keys(db, &claimed).await;
            return Err(error);
        }
        claimed.push((PRODUCT_SLUG, slug.clone()));
    }

    let old_keys = [
        (PRODUCT_SKU, std::mem::replace(&mut product.sku, sku)),
        (PRODUCT_SLUG, std::mem::replace(&mut product.slug, slug)),
    ];

    product.updated_at = Utc::now();
    if let Err(e) = db.save(PRODUCTS, &product.id, &product).await {
        release_keys(db, &claimed).await;
        return Err(e.into());
    }

    for (index, key) in old_keys {
        if claimed.iter().any(|(claimed_index, _)| *claimed_index == index) {
            db.store().release_index(index, &key).await?;
        }
    }

    sync_search(&state, &product).await;

    Ok(Json(product_view(db, product).await?))
}

/// Gives back keys claimed by an update that did not go through.
async fn release_keys(db: &Db, claimed: &[(&str, String)]) {
    for (index, key) in claimed {
        if let Err(e) = db.store().release_index(index, key).await {
            warn!("Failed to release {index} key {key}: {e}");
        }
    }
}

pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = &state.db;
    let product: Product = db
        .load(PRODUCTS, &id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    db.delete(PRODUCTS, &product.id).await?;
    db.store().release_index(PRODUCT_SKU, &product.sku).await?;
    db.store().release_index(PRODUCT_SLUG, &product.slug).await?;
    db.store().set_counter(STOCK, &product.id, 0).await?;

    if let Some(search) = &state.search {
        if let Err(e) = search.delete(&product.id).await {
            warn!("Failed to drop product {} from the index: {e}", product.id);
        }
    }

    info!("Deleted product {}", product.sku);

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Debug)]
pub struct StockInput {
    pub stock: u64,
}

pub async fn set_stock(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(id): Path<String>,
    Json(input): Json<StockInput>,
) -> Result<impl IntoResponse, AppError> {
    let product: Product = state
        .db
        .load(PRODUCTS, &id)
        .await?
        .ok_or(AppError::NotFound("Product"))?;

    state
        .db
        .store()
        .set_counter(STOCK, &product.id, input.stock as i64)
        .await?;

    Ok(Json(product_view(&state.db, product).await?))
}
