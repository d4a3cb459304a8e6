//! # Meilisearch
//!
//! Typo tolerant product search, proxied through the API.
//!
//!
//!
//! ## Schema
//! - Index for all products
//! - Fields: id, sku, name, description, category, tags, price (**int**), rating (**float**),
//!   active (**bool**), created_at (**unix seconds**)
//! - Filterable: category, active. Sortable: price, rating, created_at, name
//! - An explicit sort outranks relevance, without one hits come back by relevance
//! - SKUs match exactly, typos are only forgiven in names, tags and descriptions
//!
//!
//!
//! ## Sync
//! - Full upsert of the catalog at boot
//! - Every product write upserts that one document, deletes remove it
//! - Search results are only ids, documents and stock are read from the store so
//!   a lagging index never shows a stale price
//!
//!
//!
//! ## Commands
//!
//! Grab relevant keys.
//! ```sh
//! curl -H "Authorization: Bearer $(cat /run/secrets/MEILI_MASTER_KEY)" http://localhost:7700/keys
//! ```
use std::sync::Arc;

use meilisearch_sdk::{
    client::Client,
    errors::Error as MeiliError,
    settings::{MinWordSizeForTypos, Settings, TypoToleranceSettings},
};
use serde::{Deserialize, Serialize};
use shop::models::Product;

pub const PRODUCT_INDEX: &str = "products";
pub const PRODUCT_ID: &str = "id";
pub const PRODUCT_SKU: &str = "sku";
pub const PRODUCT_NAME: &str = "name";
pub const PRODUCT_DESCRIPTION: &str = "description";
pub const PRODUCT_TAGS: &str = "tags";
pub const PRODUCT_CATEGORY: &str = "category";
pub const PRODUCT_ACTIVE: &str = "active";
pub const PRODUCT_PRICE: &str = "price";
pub const PRODUCT_RATING: &str = "rating";
pub const PRODUCT_CREATED_AT: &str = "created_at";

pub const SORTABLE: [&str; 4] = [PRODUCT_PRICE, PRODUCT_RATING, PRODUCT_CREATED_AT, PRODUCT_NAME];

#[derive(Serialize, Deserialize)]
pub struct MeiliProduct {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub price: u64,
    pub rating: f32,
    pub active: bool,
    pub created_at: i64,
}

impl From<&Product> for MeiliProduct {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            description: product.description.clone(),
            category: product.category.clone(),
            tags: product.tags.clone(),
            price: product.price,
            rating: product.rating.average,
            active: product.active,
            created_at: product.created_at.timestamp(),
        }
    }
}

pub struct SearchHits {
    pub ids: Vec<String>,
    pub total: usize,
}

#[derive(Clone)]
pub struct ProductSearch {
    client: Arc<Client>,
}

pub async fn init_meilisearch(
    meili_url: &str,
    meili_admin_key: Option<&str>,
    products: &[Product],
) -> Result<ProductSearch, MeiliError> {
    let client = Arc::new(Client::new(meili_url, meili_admin_key)?);

    client
        .index(PRODUCT_INDEX)
        .set_settings(&init_settings())
        .await?
        .wait_for_completion(&client, None, None)
        .await?;

    let search = ProductSearch { client };
    search.upsert_all(products).await?;

    Ok(search)
}

impl ProductSearch {
    pub async fn upsert_all(&self, products: &[Product]) -> Result<(), MeiliError> {
        let documents: Vec<MeiliProduct> = products.iter().map(MeiliProduct::from).collect();

        let _result = self
            .client
            .index(PRODUCT_INDEX)
            .add_or_update(&documents, Some(PRODUCT_ID))
            .await?
            .wait_for_completion(&self.client, None, None)
            .await?;

        #[cfg(feature = "verbose")]
        tracing::info!("Meili task result: {:?}", _result);

        Ok(())
    }

    /// Enqueues without waiting, the index catches up on its own.
    pub async fn upsert(&self, product: &Product) -> Result<(), MeiliError> {
        self.client
            .index(PRODUCT_INDEX)
            .add_or_update(&[MeiliProduct::from(product)], Some(PRODUCT_ID))
            .await?;

        Ok(())
    }

    pub async fn delete(&self, product_id: &str) -> Result<(), MeiliError> {
        self.client
            .index(PRODUCT_INDEX)
            .delete_document(product_id)
            .await?;

        Ok(())
    }

    pub async fn search(
        &self,
        query: &str,
        category: Option<&str>,
        sort: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<SearchHits, MeiliError> {
        let filter = build_filter(category);
        let index = self.client.index(PRODUCT_INDEX);
        let sort_rules: Vec<&str> = sort.into_iter().collect();

        let mut search = index.search();
        search
            .with_query(query)
            .with_filter(&filter)
            .with_offset(offset)
            .with_limit(limit);

        if !sort_rules.is_empty() {
            search.with_sort(&sort_rules);
        }

        let results = search.execute::<MeiliProduct>().await?;

        Ok(SearchHits {
            total: results.estimated_total_hits.unwrap_or(results.hits.len()),
            ids: results.hits.into_iter().map(|hit| hit.result.id).collect(),
        })
    }
}

fn build_filter(category: Option<&str>) -> String {
    let mut filter = format!("{PRODUCT_ACTIVE} = true");

    if let Some(category) = category {
        let escaped = category.replace('\\', "\\\\").replace('"', "\\\"");
        filter.push_str(&format!(" AND {PRODUCT_CATEGORY} = \"{escaped}\""));
    }

    filter
}

fn init_settings() -> Settings {
    Settings::new()
        .with_ranking_rules(["sort", "words", "typo", "proximity", "attribute", "exactness"])
        .with_filterable_attributes([PRODUCT_CATEGORY, PRODUCT_ACTIVE])
        .with_searchable_attributes([PRODUCT_NAME, PRODUCT_SKU, PRODUCT_TAGS, PRODUCT_DESCRIPTION])
        .with_sortable_attributes(SORTABLE)
        .with_typo_tolerance(TypoToleranceSettings {
            enabled: Some(true),
            disable_on_attributes: Some(vec![PRODUCT_SKU.to_string()]),
            disable_on_words: None,
            min_word_size_for_typos: Some(MinWordSizeForTypos {
                one_typo: Some(4),
                two_typos: Some(8),
            }),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_sort_and_protect_skus() {
        let settings = init_settings();

        assert_eq!(
            settings.sortable_attributes.unwrap(),
            ["price", "rating", "created_at", "name"]
        );
        assert_eq!(settings.ranking_rules.unwrap()[0], "sort");
        assert!(settings.searchable_attributes.unwrap().contains(&PRODUCT_SKU.to_string()));

        let typos = settings.typo_tolerance.unwrap();
        assert_eq!(typos.disable_on_attributes, Some(vec![PRODUCT_SKU.to_string()]));
    }

    #[test]
    fn test_filter_escapes_category() {
        assert_eq!(build_filter(None), "active = true");
        assert_eq!(
            build_filter(Some("cold \"brew\"")),
            "active = true AND category = \"cold \\\"brew\\\"\""
        );
    }
}
