//! # Shop
//!
//! Domain shared between the API server and the catalog processor.
//!
//! - [`catalog`]: protobuf seed file listing the menu, read at boot to fill an empty store
//! - [`models`]: stored documents (products, customers, vouchers, orders, reviews, loyalty ledger)
//! - [`pricing`]: voucher discounts, loyalty points and order quotes, all in integer VND
//! - [`cart`]: cart state reduction
use std::{fs, path::Path};

use prost::Message;
use thiserror::Error;

pub mod cart;
pub mod catalog;
pub mod models;
pub mod pricing;
pub mod remote;
pub mod utils;

use catalog::Catalog;

pub use remote::fetch_catalog;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed catalog: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Failed to fetch catalog: {0}")]
    Remote(#[from] reqwest::Error),
}

pub fn read_catalog(path: impl AsRef<Path>) -> Result<Catalog, CatalogError> {
    let data = fs::read(path)?;

    Ok(Catalog::decode(&*data)?)
}

pub fn write_catalog(path: impl AsRef<Path>, catalog: &Catalog) -> Result<(), CatalogError> {
    fs::write(path, catalog.encode_to_vec())?;

    Ok(())
}
