use chrono::Utc;
use shop::{catalog::Catalog, utils::sanitize};

pub const DEFAULT_STOCK: u64 = 100;

/// Three letter prefix from a category, padded with `X`, e.g. "Cold Brew" -> "COL".
pub fn sku_prefix(category: &str) -> String {
    let mut prefix: String = sanitize(category)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(3)
        .collect::<String>()
        .to_uppercase();

    while prefix.len() < 3 {
        prefix.push('X');
    }

    prefix
}

/// First free `PREFIX-NNN` not already taken in `catalog`.
pub fn next_sku(catalog: &Catalog, prefix: &str) -> String {
    (1..)
        .map(|n| format!("{prefix}-{n:03}"))
        .find(|sku| !catalog.products.iter().any(|p| &p.sku == sku))
        .unwrap_or_default()
}

pub fn category_label(name: &str) -> String {
    sanitize(name)
}

pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use shop::catalog::SeedProduct;

    use super::*;

    #[test]
    fn test_prefix() {
        assert_eq!(sku_prefix("Cold Brew"), "COL");
        assert_eq!(sku_prefix("Tea"), "TEA");
        assert_eq!(sku_prefix("Ăn"), "NXX");
        assert_eq!(sku_prefix("!!"), "XXX");
    }

    #[test]
    fn test_next_sku_skips_taken() {
        let mut catalog = Catalog::default();
        assert_eq!(next_sku(&catalog, "COF"), "COF-001");

        catalog.products.push(SeedProduct {
            sku: "COF-001".to_string(),
            ..Default::default()
        });
        assert_eq!(next_sku(&catalog, "COF"), "COF-002");
    }
}
