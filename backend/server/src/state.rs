use std::sync::Arc;

use anyhow::Context;
use shop::models::Product;
use tracing::{info, warn};

use super::{
    auth::TokenKeys,
    config::Config,
    database::init_redis,
    memory::MemoryStore,
    search::{ProductSearch, init_meilisearch},
    seed::{ensure_admin, seed_catalog},
    store::{Db, Store, collections},
};

pub struct AppState {
    pub config: Config,
    pub db: Db,
    pub search: Option<ProductSearch>,
    pub keys: TokenKeys,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Arc<Self>> {
        let config = Config::load()?;

        let store: Arc<dyn Store> = match config.redis_url.as_deref() {
            Some(redis_url) => Arc::new(
                init_redis(redis_url)
                    .await
                    .context("Redis misconfigured")?,
            ),
            None => {
                warn!("No REDIS_URL, data lives in memory and is lost on restart");
                Arc::new(MemoryStore::default())
            }
        };
        let db = Db::new(store);

        seed_catalog(&db, &config).await?;
        ensure_admin(&db, &config).await?;

        let search = match config.meili_url.as_deref() {
            Some(meili_url) => {
                let products: Vec<Product> = db.load_all(collections::PRODUCTS).await?;

                match init_meilisearch(meili_url, config.meili_key.as_deref(), &products).await {
                    Ok(search) => {
                        info!("Indexed {} products", products.len());
                        Some(search)
                    }
                    Err(e) => {
                        warn!("Meilisearch unavailable, falling back to store filtering: {e}");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(Self::build(config, db, search))
    }

    /// State over an existing store, no search index.
    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Arc<Self> {
        Self::build(config, Db::new(store), None)
    }

    fn build(config: Config, db: Db, search: Option<ProductSearch>) -> Arc<Self> {
        let keys = TokenKeys::new(config.jwt_secret.as_bytes());

        Arc::new(Self {
            config,
            db,
            search,
            keys,
        })
    }
}
