//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PARSE_BASE_URL` - Root of the Parse REST API (e.g. `https://parseapi.back4app.com`)
//! - `PARSE_APP_ID` - Parse application id
//! - `PARSE_REST_KEY` - Parse REST API key
//!
//! ## Optional
//! - `CATALOG_URL` - Card search endpoint (default: `https://api.pokemontcg.io/v2/cards`)
//! - `CATALOG_QUERY` - Card search filter (default: `subtypes:mega`)
//! - `CATALOG_ORDER_BY` - Card search ordering (default: `-set.releaseDate`)
//! - `CATALOG_PRODUCT_CLASS` - Parse class holding store products (default: `Product`)
//! - `CATALOG_MAX_ATTEMPTS` - Fetch attempts before giving up (default: 3)
//! - `CATALOG_RETRY_DELAY_MS` - Pause between attempts (default: 2000)
//! - `CART_SAVE_DEBOUNCE_MS` - Quiet period before a cart save (default: 1000)
//! - `SHIPPING_FEE` - Flat shipping charge (default: 20.00)
//! - `POKEBOLSA_STORAGE_PATH` - Local key-value file (default: `.pokebolsa/storage.json`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use pokebolsa_core::Price;
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_CATALOG_URL: &str = "https://api.pokemontcg.io/v2/cards";
const DEFAULT_STORAGE_PATH: &str = ".pokebolsa/storage.json";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Top-level configuration, built once at process start and injected.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Remote document store
    pub parse: ParseConfig,
    /// External card catalog
    pub catalog: CatalogConfig,
    /// Quiet period before the cart is written to the remote store
    pub save_debounce: Duration,
    /// Flat shipping charge shown in the cart summary
    pub shipping_fee: Price,
    /// File backing the local key-value store
    pub storage_path: PathBuf,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Parse REST API configuration.
///
/// Implements `Debug` manually to redact the REST key.
#[derive(Clone)]
pub struct ParseConfig {
    /// API root; user endpoints hang off it directly, classes under `/classes`
    pub base_url: Url,
    /// Sent as `X-Parse-Application-Id`
    pub app_id: String,
    /// Sent as `X-Parse-REST-API-Key`
    pub rest_key: SecretString,
}

impl std::fmt::Debug for ParseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseConfig")
            .field("base_url", &self.base_url.as_str())
            .field("app_id", &self.app_id)
            .field("rest_key", &"[REDACTED]")
            .finish()
    }
}

/// Catalog endpoints and retry behaviour.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Card search endpoint
    pub url: Url,
    /// Value of the `q` parameter
    pub query: String,
    /// Value of the `orderBy` parameter
    pub order_by: String,
    /// Parse class holding the store's own products
    pub product_class: String,
    /// Hard cap on fetch attempts
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub retry_delay: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            query: "subtypes:mega".to_string(),
            order_by: "-set.releaseDate".to_string(),
            product_class: "Product".to_string(),
            max_attempts: 3,
            retry_delay: Duration::from_millis(2000),
        }
    }
}

#[allow(clippy::expect_used)] // constant, checked by test_default_catalog_url
fn default_catalog_url() -> Url {
    Url::parse(DEFAULT_CATALOG_URL).expect("default catalog URL is valid")
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or malformed,
    /// or if the REST key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let parse = ParseConfig::from_env()?;
        let catalog = CatalogConfig::from_env()?;
        let save_debounce = Duration::from_millis(parse_env_or("CART_SAVE_DEBOUNCE_MS", 1000)?);
        let shipping_fee = parse_price("SHIPPING_FEE", Price::from_cents(2000))?;
        let storage_path = PathBuf::from(get_env_or_default(
            "POKEBOLSA_STORAGE_PATH",
            DEFAULT_STORAGE_PATH,
        ));

        Ok(Self {
            parse,
            catalog,
            save_debounce,
            shipping_fee,
            storage_path,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

impl ParseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_url("PARSE_BASE_URL", &get_required_env("PARSE_BASE_URL")?)?,
            app_id: get_required_env("PARSE_APP_ID")?,
            rest_key: get_validated_secret("PARSE_REST_KEY")?,
        })
    }
}

impl CatalogConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let url = match get_optional_env("CATALOG_URL") {
            Some(raw) => parse_url("CATALOG_URL", &raw)?,
            None => defaults.url,
        };
        let max_attempts: u32 = parse_env_or("CATALOG_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CATALOG_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            url,
            query: get_env_or_default("CATALOG_QUERY", &defaults.query),
            order_by: get_env_or_default("CATALOG_ORDER_BY", &defaults.order_by),
            product_class: get_env_or_default("CATALOG_PRODUCT_CLASS", &defaults.product_class),
            max_attempts,
            retry_delay: Duration::from_millis(parse_env_or("CATALOG_RETRY_DELAY_MS", 2000)?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_price(key: &str, default: Price) -> Result<Price, ConfigError> {
    let Some(raw) = get_optional_env(key) else {
        return Ok(default);
    };
    let amount = Decimal::from_str(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    Price::new(amount).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // key lengths are tiny
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Reject placeholder values and low-entropy strings.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_url() {
        let catalog = CatalogConfig::default();
        assert_eq!(catalog.url.as_str(), DEFAULT_CATALOG_URL);
        assert_eq!(catalog.max_attempts, 3);
        assert_eq!(catalog.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rest_key_placeholder_rejected() {
        let err = validate_secret_strength("your-rest-key", "PARSE_REST_KEY").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_rest_key_low_entropy_rejected() {
        assert!(validate_secret_strength("abababababababab", "PARSE_REST_KEY").is_err());
    }

    #[test]
    fn test_realistic_rest_key_accepted() {
        assert!(validate_secret_strength("Qm7fZ2xLk9PwR4tVb8NcY1hJdS6gE3uA0oTiWq5K", "K").is_ok());
    }

    #[test]
    fn test_parse_config_debug_redacts_key() {
        let config = ParseConfig {
            base_url: Url::parse("https://parse.test").unwrap(),
            app_id: "app-123".to_string(),
            rest_key: SecretString::from("super_secret_rest_key"),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("app-123"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_rest_key"));
    }
}
