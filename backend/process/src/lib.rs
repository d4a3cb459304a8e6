//! # Catalog Processing
//!
//! Turns a hand-written menu into the binary catalog seed the server imports.
//!
//! ## Steps
//! 1. Load the existing catalog when merging, otherwise start empty.
//!
//! 2. Read the menu JSON. Each category holds items with at least a name and a price.
//!
//! 3. Normalise the category and the SKU. Items without a SKU get the next free
//!    `PREFIX-NNN`, where the prefix comes from the category.
//!
//! 4. Items whose SKU already exists replace the old entry in place, keeping the file order stable.
//!
//! 5. Skip items that have no usable name or a zero price.
//!
//! 6. Write the catalog back out.
use std::{fs::read_to_string, path::Path};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};

pub mod models;
pub mod utils;

use models::{Menu, MenuItem};
use shop::{
    catalog::{Catalog, SeedProduct},
    read_catalog,
    utils::{is_valid_sku, normalize_sku, sanitize},
    write_catalog,
};
use utils::{DEFAULT_STOCK, category_label, next_sku, now_unix, sku_prefix};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

pub fn load_menu(menu_path: &Path, catalog_path: &Path, merge: bool) -> Result<()> {
    let mut catalog = if merge && catalog_path.exists() {
        read_catalog(catalog_path).context("existing catalog unreadable")?
    } else {
        Catalog::default()
    };

    println!("Loaded Products: {}\n", catalog.products.len());

    let raw = read_to_string(menu_path)
        .with_context(|| format!("failed to read {}", menu_path.display()))?;
    let menu: Menu = serde_json::from_str(&raw).context("menu is not valid JSON")?;

    let summary = merge_menu(&mut catalog, menu)?;

    if summary.added == 0 && summary.updated == 0 {
        println!("No new or changed products found.");
    } else {
        println!("Total New Products: {}", summary.added);
        println!("Total Updated Products: {}", summary.updated);
    }
    println!("Skipped: {}", summary.skipped);
    println!("Product Verification: {}", catalog.products.len());

    catalog.generated_at = now_unix();
    write_catalog(catalog_path, &catalog).context("failed to write catalog")?;

    Ok(())
}

pub fn merge_menu(catalog: &mut Catalog, menu: Menu) -> Result<Summary> {
    let total: usize = menu.categories.iter().map(|c| c.items.len()).sum();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    let mut summary = Summary::default();

    for category in menu.categories {
        let label = category_label(&category.name);
        if label.is_empty() {
            summary.skipped += category.items.len();
            pb.inc(category.items.len() as u64);
            continue;
        }

        let prefix = sku_prefix(&label);

        for item in category.items {
            pb.set_message(item.name.clone());

            match seed_product(catalog, &label, &prefix, item)? {
                Some(product) => upsert(catalog, product, &mut summary),
                None => summary.skipped += 1,
            }

            pb.inc(1);
        }
    }

    pb.finish_with_message("Done");

    Ok(summary)
}

fn seed_product(
    catalog: &Catalog,
    category: &str,
    prefix: &str,
    item: MenuItem,
) -> Result<Option<SeedProduct>> {
    let name = item.name.trim().to_string();
    if sanitize(&name).is_empty() || item.price == 0 {
        #[cfg(feature = "verbose")]
        println!("Skipping {:?}", item.name);

        return Ok(None);
    }

    let sku = match item.sku {
        Some(sku) => {
            let sku = normalize_sku(&sku);
            if !is_valid_sku(&sku) {
                bail!("invalid SKU {sku:?} for {name:?}");
            }
            sku
        }
        None => next_sku(catalog, prefix),
    };

    Ok(Some(SeedProduct {
        sku,
        name,
        description: item.description.trim().to_string(),
        category: category.to_string(),
        price: item.price,
        stock: item.stock.unwrap_or(DEFAULT_STOCK),
        images: item.images,
        tags: item.tags.iter().map(|t| sanitize(t)).filter(|t| !t.is_empty()).collect(),
    }))
}

fn upsert(catalog: &mut Catalog, product: SeedProduct, summary: &mut Summary) {
    match catalog.products.iter_mut().find(|p| p.sku == product.sku) {
        Some(existing) => {
            #[cfg(feature = "verbose")]
            println!("Updated {}", product.sku);

            *existing = product;
            summary.updated += 1;
        }
        None => {
            #[cfg(feature = "verbose")]
            println!("New product! {}", product.sku);

            catalog.products.push(product);
            summary.added += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu(json: &str) -> Menu {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_merge_assigns_skus_and_skips_junk() {
        let mut catalog = Catalog::default();
        let summary = merge_menu(
            &mut catalog,
            menu(
                r#"{"categories": [
                    {"name": "Coffee", "items": [
                        {"name": "Latte", "price": 45000},
                        {"name": "Espresso", "price": 35000, "stock": 12},
                        {"name": "???", "price": 10000},
                        {"name": "Free Water", "price": 0}
                    ]},
                    {"name": "!!!", "items": [{"name": "Ghost", "price": 1}]}
                ]}"#,
            ),
        )
        .unwrap();

        assert_eq!(
            summary,
            Summary {
                added: 2,
                updated: 0,
                skipped: 3
            }
        );
        assert_eq!(catalog.products[0].sku, "COF-001");
        assert_eq!(catalog.products[0].stock, DEFAULT_STOCK);
        assert_eq!(catalog.products[1].sku, "COF-002");
        assert_eq!(catalog.products[1].stock, 12);
        assert_eq!(catalog.products[1].category, "coffee");
    }

    #[test]
    fn test_merge_replaces_existing_sku() {
        let mut catalog = Catalog::default();
        merge_menu(
            &mut catalog,
            menu(r#"{"categories": [{"name": "Tea", "items": [{"sku": "tea-01", "name": "Oolong", "price": 40000}]}]}"#),
        )
        .unwrap();

        let summary = merge_menu(
            &mut catalog,
            menu(r#"{"categories": [{"name": "Tea", "items": [{"sku": "TEA-01", "name": "Oolong", "price": 42000}]}]}"#),
        )
        .unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(catalog.products.len(), 1);
        assert_eq!(catalog.products[0].price, 42000);
    }

    #[test]
    fn test_invalid_sku_is_an_error() {
        let mut catalog = Catalog::default();
        let result = merge_menu(
            &mut catalog,
            menu(r#"{"categories": [{"name": "Tea", "items": [{"sku": "-", "name": "Oolong", "price": 1}]}]}"#),
        );

        assert!(result.is_err());
    }
}
