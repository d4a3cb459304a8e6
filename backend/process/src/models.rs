use serde::Deserialize;

/// Menu as written by hand, e.g.
///
/// ```json
/// { "categories": [ { "name": "Coffee", "items": [ { "name": "Latte", "price": 45000 } ] } ] }
/// ```
#[derive(Deserialize)]
pub struct Menu {
    pub categories: Vec<MenuCategory>,
}

#[derive(Deserialize)]
pub struct MenuCategory {
    pub name: String,
    pub items: Vec<MenuItem>,
}

#[derive(Deserialize)]
pub struct MenuItem {
    #[serde(default)]
    pub sku: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: u64,
    #[serde(default)]
    pub stock: Option<u64>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}
