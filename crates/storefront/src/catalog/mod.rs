//! Catalog adapter.
//!
//! Fetches product listings from an upstream [`CatalogSource`], retrying a
//! bounded number of times with a fixed pause, and caches successful
//! listings for 5 minutes. Every wait is cancellable: when the token fires,
//! the fetch stops where it is and reports [`CatalogError::Cancelled`],
//! which callers treat as "nothing happened".

mod conversions;
mod sources;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use pokebolsa_core::Product;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::config::CatalogConfig;

pub use conversions::{
    CardRecord, CardSearchResponse, ProductObject, UNKNOWN_SET_DESCRIPTION, card_fallback_price,
    convert_card, convert_product_object, product_fallback_price, usable_price,
};
pub use sources::{CardSearchSource, CatalogSource, ProductClassSource, SourceError};

const CACHE_TTL: Duration = Duration::from_secs(300);

/// Terminal outcome of a listing request.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Every attempt failed.
    #[error("catalog unavailable after {attempts} attempt(s): {last}")]
    Unavailable {
        attempts: u32,
        #[source]
        last: SourceError,
    },

    /// The caller went away. Not a failure.
    #[error("catalog request cancelled")]
    Cancelled,
}

impl CatalogError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Fixed-delay retry with a hard attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl From<&CatalogConfig> for RetryPolicy {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay,
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Retrying, caching front for catalog sources.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    retry: RetryPolicy,
    cache: Cache<String, Arc<Vec<Product>>>,
}

impl Catalog {
    #[must_use]
    pub fn new(retry: RetryPolicy) -> Self {
        let cache = Cache::builder()
            .max_capacity(16)
            .time_to_live(CACHE_TTL)
            .build();

        Self {
            inner: Arc::new(CatalogInner { retry, cache }),
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    /// List products from `source`, serving a cached listing when fresh.
    ///
    /// # Errors
    ///
    /// [`CatalogError::Unavailable`] once every attempt failed, or
    /// [`CatalogError::Cancelled`] if `cancel` fired first.
    #[instrument(skip_all, fields(source = %source.cache_key()))]
    pub async fn list_products(
        &self,
        source: &dyn CatalogSource,
        cancel: &CancellationToken,
    ) -> Result<Vec<Product>, CatalogError> {
        if let Some(cached) = self.inner.cache.get(&source.cache_key()).await {
            debug!("Cache hit for catalog listing");
            return Ok(cached.as_ref().clone());
        }
        self.fetch_with_retry(source, cancel).await
    }

    /// Drop any cached listing and fetch again (pull-to-refresh).
    ///
    /// # Errors
    ///
    /// Same as [`Self::list_products`].
    pub async fn refresh(
        &self,
        source: &dyn CatalogSource,
        cancel: &CancellationToken,
    ) -> Result<Vec<Product>, CatalogError> {
        self.inner.cache.invalidate(&source.cache_key()).await;
        self.fetch_with_retry(source, cancel).await
    }

    async fn fetch_with_retry(
        &self,
        source: &dyn CatalogSource,
        cancel: &CancellationToken,
    ) -> Result<Vec<Product>, CatalogError> {
        let RetryPolicy {
            max_attempts,
            delay,
        } = self.inner.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CatalogError::Cancelled),
                result = source.fetch() => result,
            };

            let error = match result {
                Ok(products) => {
                    self.inner
                        .cache
                        .insert(source.cache_key(), Arc::new(products.clone()))
                        .await;
                    return Ok(products);
                }
                Err(error) => error,
            };

            if attempt >= max_attempts {
                warn!(attempts = attempt, error = %error, "Catalog fetch failed, giving up");
                return Err(CatalogError::Unavailable {
                    attempts: attempt,
                    last: error,
                });
            }

            warn!(
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Catalog fetch failed, retrying"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CatalogError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

// =============================================================================
// CatalogListing
// =============================================================================

/// What a product list screen shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingState {
    Loading,
    Loaded(Vec<Product>),
    /// Inline error row in place of results; the list stays empty.
    Unavailable(String),
}

/// Screen-scoped listing state with teardown.
///
/// After [`Self::unmount`] (or drop) pending fetches and retries stop and
/// the state is never touched again.
#[derive(Debug)]
pub struct CatalogListing {
    state: Arc<watch::Sender<ListingState>>,
    cancel: CancellationToken,
}

impl Default for CatalogListing {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogListing {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(ListingState::Loading);
        Self {
            state: Arc::new(state),
            cancel: CancellationToken::new(),
        }
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> ListingState {
        self.state.borrow().clone()
    }

    /// Watch for state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ListingState> {
        self.state.subscribe()
    }

    /// Start loading from `source` in the background.
    pub fn load(&self, catalog: &Catalog, source: Arc<dyn CatalogSource>) -> JoinHandle<()> {
        self.spawn(catalog.clone(), source, false)
    }

    /// Like [`Self::load`] but bypasses the cache.
    pub fn refresh(&self, catalog: &Catalog, source: Arc<dyn CatalogSource>) -> JoinHandle<()> {
        self.spawn(catalog.clone(), source, true)
    }

    fn spawn(
        &self,
        catalog: Catalog,
        source: Arc<dyn CatalogSource>,
        bypass_cache: bool,
    ) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();

        if !cancel.is_cancelled() {
            state.send_replace(ListingState::Loading);
        }

        tokio::spawn(async move {
            let result = if bypass_cache {
                catalog.refresh(source.as_ref(), &cancel).await
            } else {
                catalog.list_products(source.as_ref(), &cancel).await
            };

            if cancel.is_cancelled() {
                return;
            }

            match result {
                Ok(products) => {
                    state.send_replace(ListingState::Loaded(products));
                }
                Err(CatalogError::Cancelled) => {}
                Err(error) => {
                    state.send_replace(ListingState::Unavailable(error.to_string()));
                }
            }
        })
    }

    /// Stop pending work; the state is frozen from here on.
    pub fn unmount(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_unmounted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for CatalogListing {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
