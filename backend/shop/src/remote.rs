use prost::Message;
use reqwest::get;

use crate::{CatalogError, catalog::Catalog};

/// Downloads a catalog published elsewhere, e.g. a release asset.
pub async fn fetch_catalog(url: &str) -> Result<Catalog, CatalogError> {
    let response = get(url).await?.error_for_status()?;
    let bytes = response.bytes().await?;

    Ok(Catalog::decode(&*bytes)?)
}
