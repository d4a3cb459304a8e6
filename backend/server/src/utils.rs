use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 100;

#[derive(Deserialize, Debug, Default, Clone, Copy)]
pub struct Pagination {
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl Pagination {
    /// 1-based page and a per-page size clamped to `1..=MAX_PER_PAGE`.
    pub fn resolve(self) -> (usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);

        (page, per_page)
    }

    pub fn offset(self) -> usize {
        let (page, per_page) = self.resolve();
        (page - 1) * per_page
    }
}

#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn slice(items: Vec<T>, pagination: Pagination) -> Self {
        let (page, per_page) = pagination.resolve();
        let total = items.len();

        let items = items
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        Self {
            items,
            page,
            per_page,
            total,
        }
    }
}

/// `BR-YYYYMMDD-XXXXXX`, the suffix is random uppercase alphanumerics.
pub fn order_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|byte| (byte as char).to_ascii_uppercase())
        .collect();

    format!("BR-{}-{suffix}", now.format("%Y%m%d"))
}

pub fn non_empty(field: &str, value: &str) -> Result<String, crate::error::AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::error::AppError::MalformedPayload(format!(
            "{field} must not be empty"
        )));
    }

    Ok(trimmed.to_string())
}
