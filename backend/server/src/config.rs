use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Secret {0} is required")]
    MissingSecret(&'static str),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub redis_url: Option<String>,
    pub meili_url: Option<String>,
    pub meili_key: Option<String>,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub cors_origin: String,
    pub catalog_path: Option<String>,
    pub catalog_url: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1111,
            redis_url: None,
            meili_url: None,
            meili_key: None,
            jwt_secret: "dev-only-secret".to_string(),
            token_ttl_hours: 168,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            cors_origin: "*".to_string(),
            catalog_path: None,
            catalog_url: None,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            redis_url: optional("REDIS_URL"),
            meili_url: optional("MEILI_URL"),
            meili_key: read_secret("MEILI_ADMIN_KEY"),
            jwt_secret: read_secret("JWT_SECRET").ok_or(ConfigError::MissingSecret("JWT_SECRET"))?,
            token_ttl_hours: try_load("TOKEN_TTL_HOURS", "168")?,
            bcrypt_cost: try_load("BCRYPT_COST", &bcrypt::DEFAULT_COST.to_string())?,
            cors_origin: try_load("CORS_ORIGIN", "*")?,
            catalog_path: optional("CATALOG_PATH"),
            catalog_url: optional("CATALOG_URL"),
            admin_email: optional("ADMIN_EMAIL"),
            admin_password: read_secret("ADMIN_PASSWORD"),
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn optional(key: &str) -> Option<String> {
    let value = var(key);
    if value.is_none() {
        info!("{key} not set");
    }

    value
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");

            ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }
        })
}

/// Docker secret first, then an environment variable of the same name.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(secret) => Some(secret.trim().to_string()).filter(|s| !s.is_empty()),
        Err(e) => {
            warn!("Failed to read {secret_name} from file: {e}");
            var(secret_name)
        }
    }
}
