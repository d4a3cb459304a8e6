use std::sync::LazyLock;

use regex::Regex;

static UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[_]").unwrap());
static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9- ]").unwrap());
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").unwrap());
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").unwrap());
static SKU: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9-]{1,31}$").unwrap());

/// Lowercase, strip everything but letters, digits, dashes and single spaces.
pub fn sanitize(input: &str) -> String {
    let s = UNDERSCORES.replace_all(input, " ");
    let s = UNSAFE_CHARS.replace_all(&s, "");

    SPACES.replace_all(s.trim(), " ").to_lowercase()
}

/// URL slug from a display name, e.g. "Cà phê sữa đá" -> "c-ph-sa".
/// Non-ASCII letters are dropped, so callers fall back to the SKU when empty.
pub fn slugify(name: &str) -> String {
    let spaced = sanitize(name).replace(' ', "-");

    DASHES
        .replace_all(&spaced, "-")
        .trim_matches('-')
        .to_string()
}

pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_uppercase()
}

pub fn is_valid_sku(sku: &str) -> bool {
    SKU.is_match(sku)
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        assert_eq!(sanitize("hello_world"), "hello world");
        assert_eq!(sanitize("Cold-Brew"), "cold-brew");
        assert_eq!(sanitize("clean-this_text!"), "clean-this text");
    }

    #[test]
    fn test_leading_trailing_spaces() {
        assert_eq!(sanitize("   latte   "), "latte");
        assert_eq!(sanitize("  iced   mocha  "), "iced mocha");
    }

    #[test]
    fn test_special_characters() {
        assert_eq!(sanitize("!@#$%^&*()"), "");
        assert_eq!(sanitize("abc123!@#"), "abc123");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Salted Caramel Latte"), "salted-caramel-latte");
        assert_eq!(slugify("  Espresso -- Double "), "espresso-double");
        assert_eq!(slugify("Cà phê"), "c-ph");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_sku() {
        assert!(is_valid_sku("CF-001"));
        assert!(is_valid_sku(&normalize_sku(" tea-12 ")));
        assert!(!is_valid_sku("-CF"));
        assert!(!is_valid_sku("C"));
        assert!(!is_valid_sku("cf-001"));
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("     "), "");
    }
}
