//! Catalog listing.
//!
//! Mirrors the product list screen: a listing that loads in the background
//! and is torn down on Ctrl+C, which stops any pending retry immediately.

use pokebolsa_storefront::catalog::{Catalog, CatalogListing, ListingState, RetryPolicy};
use pokebolsa_storefront::error::Result;
use tracing::{info, warn};

use super::{Context, SourceKind};

/// List products from `kind`, optionally bypassing the cache.
///
/// # Errors
///
/// Never fails on catalog errors; those render as an inline message.
pub async fn list(ctx: &Context, kind: SourceKind, refresh: bool) -> Result<()> {
    let catalog = Catalog::new(RetryPolicy::from(&ctx.config.catalog));
    let listing = CatalogListing::new();
    let source = ctx.source(kind);

    info!("Loading {kind:?}...");
    let task = if refresh {
        listing.refresh(&catalog, source)
    } else {
        listing.load(&catalog, source)
    };

    tokio::select! {
        joined = task => {
            if let Err(e) = joined {
                warn!(error = %e, "Catalog task failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            listing.unmount();
            info!("Cancelled");
            return Ok(());
        }
    }

    match listing.state() {
        ListingState::Loaded(products) if products.is_empty() => info!("No products found"),
        ListingState::Loaded(products) => {
            for product in &products {
                info!(
                    "{:<16} {:<32} {:>10}  {}",
                    product.id,
                    product.name,
                    product.unit_price.display(),
                    product.description
                );
            }
            info!("{} product(s)", products.len());
        }
        ListingState::Unavailable(message) => {
            warn!("Could not load products: {message}");
        }
        ListingState::Loading => {}
    }
    Ok(())
}
