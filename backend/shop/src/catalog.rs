//! # Catalog Seed
//!
//! Binary file holding the initial menu. Built by `process` from a JSON menu,
//! imported by the server when its product collection is empty.
//!
//! ## Notes
//! - Only repeated fields keep their order, so products are imported in file order.
//! - Prices and stock are plain integers (VND, units).
use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct Catalog {
    #[prost(message, repeated, tag = "1")]
    pub products: Vec<SeedProduct>,

    /// Unix seconds.
    #[prost(int64, tag = "2")]
    pub generated_at: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct SeedProduct {
    #[prost(string, tag = "1")]
    pub sku: String,

    #[prost(string, tag = "2")]
    pub name: String,

    #[prost(string, tag = "3")]
    pub description: String,

    #[prost(string, tag = "4")]
    pub category: String,

    #[prost(uint64, tag = "5")]
    pub price: u64,

    #[prost(uint64, tag = "6")]
    pub stock: u64,

    #[prost(string, repeated, tag = "7")]
    pub images: Vec<String>,

    #[prost(string, repeated, tag = "8")]
    pub tags: Vec<String>,
}
