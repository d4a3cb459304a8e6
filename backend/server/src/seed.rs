//! Boot-time data: the catalog for an empty store and the admin account.
use anyhow::{Context, bail};
use shop::{
    catalog::Catalog,
    fetch_catalog,
    models::{Customer, Role},
    read_catalog,
    utils::normalize_email,
};
use tracing::{info, warn};

use crate::{
    config::Config,
    error::AppError,
    routes::{
        auth::{RegisterInput, insert_customer},
        products::{ProductInput, insert_product},
    },
    store::{
        Db,
        collections::{CUSTOMERS, PRODUCTS},
        indexes::CUSTOMER_EMAIL,
    },
};

async fn load_seed(config: &Config) -> anyhow::Result<Option<Catalog>> {
    if let Some(path) = config.catalog_path.as_deref() {
        let catalog = read_catalog(path).with_context(|| format!("Failed to load {path}"))?;
        return Ok(Some(catalog));
    }

    if let Some(url) = config.catalog_url.as_deref() {
        let catalog = fetch_catalog(url)
            .await
            .with_context(|| format!("Failed to fetch {url}"))?;
        return Ok(Some(catalog));
    }

    Ok(None)
}

/// Imports the catalog when the store has no products yet. Returns how many were imported.
pub async fn seed_catalog(db: &Db, config: &Config) -> anyhow::Result<usize> {
    if !db.store().fetch_all(PRODUCTS).await?.is_empty() {
        info!("Products already present, skipping catalog import");
        return Ok(0);
    }

    let Some(catalog) = load_seed(config).await? else {
        info!("No catalog configured, starting with an empty menu");
        return Ok(0);
    };

    let mut imported = 0;
    for seed in catalog.products {
        let sku = seed.sku.clone();
        let input = ProductInput {
            sku: seed.sku,
            name: seed.name,
            slug: None,
            description: seed.description,
            category: seed.category,
            price: seed.price,
            images: seed.images,
            tags: seed.tags,
            active: true,
            stock: seed.stock,
        };

        match insert_product(db, input).await {
            Ok(_) => imported += 1,
            Err(AppError::Store(e)) => return Err(e).context("Catalog import failed"),
            Err(e) => warn!("Skipping catalog entry {sku}: {e}"),
        }
    }

    info!("Imported {imported} products from the catalog");

    Ok(imported)
}

/// Makes sure `ADMIN_EMAIL` exists and is an active admin.
pub async fn ensure_admin(db: &Db, config: &Config) -> anyhow::Result<()> {
    let Some(email) = config.admin_email.as_deref() else {
        return Ok(());
    };
    let email = normalize_email(email);

    if let Some(mut customer) = db
        .find_by_index::<Customer>(CUSTOMER_EMAIL, &email, CUSTOMERS)
        .await?
    {
        if customer.role != Role::Admin || !customer.active {
            customer.role = Role::Admin;
            customer.active = true;
            db.save(CUSTOMERS, &customer.id, &customer).await?;
            info!("Promoted {email} to admin");
        }

        return Ok(());
    }

    let Some(password) = config.admin_password.clone() else {
        bail!("ADMIN_EMAIL is set but ADMIN_PASSWORD is missing");
    };

    let input = RegisterInput {
        email,
        password,
        name: "Admin".to_string(),
        phone: None,
    };

    insert_customer(db, config.bcrypt_cost, input, Role::Admin)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create admin account: {e}"))?;

    Ok(())
}
