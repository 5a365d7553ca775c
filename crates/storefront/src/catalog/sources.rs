//! Upstream catalog sources.

use async_trait::async_trait;
use pokebolsa_core::Product;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use super::conversions::{CardSearchResponse, convert_card_response, convert_product_objects};
use crate::config::CatalogConfig;
use crate::parse::{ParseClient, ParseError};

/// A single failed fetch from an upstream source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("product store error: {0}")]
    Store(#[from] ParseError),

    #[error("JSON parse error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Something that can list products.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Stable key for caching this source's listing.
    fn cache_key(&self) -> String;

    /// One fetch attempt, no retries.
    async fn fetch(&self) -> Result<Vec<Product>, SourceError>;
}

// =============================================================================
// Parse `Product` class
// =============================================================================

/// The store's own products, kept in a Parse class.
#[derive(Debug, Clone)]
pub struct ProductClassSource {
    client: ParseClient,
    class: String,
}

impl ProductClassSource {
    #[must_use]
    pub fn new(client: ParseClient, class: impl Into<String>) -> Self {
        Self {
            client,
            class: class.into(),
        }
    }
}

#[async_trait]
impl CatalogSource for ProductClassSource {
    fn cache_key(&self) -> String {
        format!("products:{}", self.class)
    }

    #[instrument(skip(self), fields(class = %self.class))]
    async fn fetch(&self) -> Result<Vec<Product>, SourceError> {
        let objects: Vec<serde_json::Value> = self.client.query(&self.class, None).await?;
        Ok(convert_product_objects(objects))
    }
}

// =============================================================================
// Card search API
// =============================================================================

/// External trading-card search (`GET <url>?q=<filter>&orderBy=<field>`).
#[derive(Debug, Clone)]
pub struct CardSearchSource {
    client: reqwest::Client,
    url: Url,
}

impl CardSearchSource {
    /// Build the request URL from the catalog configuration.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &CatalogConfig) -> Self {
        Self::with_query(client, config.url.clone(), &config.query, &config.order_by)
    }

    #[must_use]
    pub fn with_query(client: reqwest::Client, mut url: Url, query: &str, order_by: &str) -> Self {
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("orderBy", order_by);
        Self { client, url }
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl CatalogSource for CardSearchSource {
    fn cache_key(&self) -> String {
        format!("cards:{}", self.url)
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Vec<Product>, SourceError> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let body: CardSearchResponse = serde_json::from_slice(&response.bytes().await?)?;
        let products = convert_card_response(body);
        debug!(count = products.len(), "Cards fetched");
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_search_url_carries_query() {
        let source = CardSearchSource::new(reqwest::Client::new(), &CatalogConfig::default());
        assert_eq!(
            source.url().as_str(),
            "https://api.pokemontcg.io/v2/cards?q=subtypes%3Amega&orderBy=-set.releaseDate"
        );
    }

    #[test]
    fn test_cache_keys_differ_per_source() {
        let cards = CardSearchSource::new(reqwest::Client::new(), &CatalogConfig::default());
        assert!(cards.cache_key().starts_with("cards:"));
    }
}
