//! CLI command implementations.

pub mod account;
pub mod cart;
pub mod catalog;

use std::sync::Arc;
use std::time::Duration;

use pokebolsa_storefront::catalog::{CardSearchSource, ProductClassSource};
use pokebolsa_storefront::parse::ParseError;
use pokebolsa_storefront::{
    CatalogSource, FileStore, ParseClient, SessionIdentity, StoreConfig, error::Result,
};

/// Which catalog a command reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Trading cards from the card search API
    Cards,
    /// Store products from the Parse `Product` class
    Products,
}

/// Everything the commands share, built once from configuration.
pub struct Context {
    pub config: StoreConfig,
    pub parse: ParseClient,
    pub http: reqwest::Client,
    pub storage: Arc<FileStore>,
}

impl Context {
    /// Build clients from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let parse = ParseClient::new(&config.parse)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(ParseError::Http)?;
        let storage = Arc::new(FileStore::new(config.storage_path.clone()));

        Ok(Self {
            config,
            parse,
            http,
            storage,
        })
    }

    pub fn identity(&self) -> SessionIdentity<Arc<FileStore>> {
        SessionIdentity::new(Arc::clone(&self.storage))
    }

    pub fn source(&self, kind: SourceKind) -> Arc<dyn CatalogSource> {
        match kind {
            SourceKind::Cards => Arc::new(CardSearchSource::new(
                self.http.clone(),
                &self.config.catalog,
            )),
            SourceKind::Products => Arc::new(ProductClassSource::new(
                self.parse.clone(),
                self.config.catalog.product_class.clone(),
            )),
        }
    }
}
