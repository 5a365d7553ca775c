//! Cart commands.
//!
//! Each invocation is one short app session: hydrate the cart, apply the
//! mutation, wait for the debounced save to settle, then shut down.

use std::sync::Arc;

use pokebolsa_core::{ProductId, QuantityChange};
use pokebolsa_storefront::catalog::{Catalog, RetryPolicy};
use pokebolsa_storefront::error::{AppError, Result, add_breadcrumb};
use pokebolsa_storefront::{CartSynchronizer, ParseCartStore, SyncNotice, SyncOptions};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{Context, SourceKind};

type Synchronizer = CartSynchronizer<ParseCartStore>;

async fn open(ctx: &Context) -> Synchronizer {
    let store = Arc::new(ParseCartStore::new(ctx.parse.clone()));
    let mut sync = CartSynchronizer::new(
        store,
        SyncOptions {
            debounce: ctx.config.save_debounce,
        },
    );
    sync.load(&ctx.identity()).await;
    sync
}

/// Print the cart and its totals.
///
/// # Errors
///
/// Never fails; a cart that cannot be loaded shows as empty.
pub async fn show(ctx: &Context) -> Result<()> {
    let mut sync = open(ctx).await;
    print_cart(ctx, &sync);
    sync.shutdown().await;
    Ok(())
}

/// Add one unit of a catalog product.
///
/// # Errors
///
/// [`AppError::NotFound`] if `id` is not in the catalog, or the catalog
/// error when it cannot be listed.
pub async fn add(ctx: &Context, id: &str, kind: SourceKind) -> Result<()> {
    let catalog = Catalog::new(RetryPolicy::from(&ctx.config.catalog));
    let products = catalog
        .list_products(ctx.source(kind).as_ref(), &CancellationToken::new())
        .await?;
    let product = products
        .into_iter()
        .find(|product| product.id.as_str() == id)
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;

    let mut sync = open(ctx).await;
    add_breadcrumb("cart", "Added item", Some(&[("product_id", id)]));
    sync.add_item(&product);
    info!("Added {} to the cart", product.name);
    finish(ctx, sync).await
}

/// Remove a line entirely.
///
/// # Errors
///
/// [`AppError::NotFound`] if the cart has no such line.
pub async fn remove(ctx: &Context, id: &str) -> Result<()> {
    let mut sync = open(ctx).await;
    let id = existing_line(&sync, id)?;
    add_breadcrumb("cart", "Removed item", Some(&[("product_id", id.as_str())]));
    sync.remove_item(&id);
    finish(ctx, sync).await
}

/// Change a line's quantity by one. Decreasing below one removes it.
///
/// # Errors
///
/// [`AppError::NotFound`] if the cart has no such line.
pub async fn change(ctx: &Context, id: &str, change: QuantityChange) -> Result<()> {
    let mut sync = open(ctx).await;
    let id = existing_line(&sync, id)?;
    add_breadcrumb("cart", "Changed quantity", Some(&[("product_id", id.as_str())]));
    sync.change_quantity(&id, change);
    finish(ctx, sync).await
}

fn existing_line(sync: &Synchronizer, id: &str) -> Result<ProductId> {
    let id = ProductId::new(id);
    if sync.cart().get(&id).is_none() {
        return Err(AppError::NotFound(format!("cart line {id}")));
    }
    Ok(id)
}

async fn finish(ctx: &Context, mut sync: Synchronizer) -> Result<()> {
    let mut notices = sync.take_notices();
    sync.settled().await;

    if let Some(notices) = notices.as_mut() {
        while let Ok(notice) = notices.try_recv() {
            match notice {
                SyncNotice::Created(record_id) => info!(record_id = %record_id, "Cart saved"),
                SyncNotice::Updated(record_id) => info!(record_id = %record_id, "Cart updated"),
                SyncNotice::SaveFailed { message } => {
                    warn!("Cart could not be saved, it is kept on this device: {message}");
                }
            }
        }
    }

    print_cart(ctx, &sync);
    sync.shutdown().await;
    Ok(())
}

fn print_cart(ctx: &Context, sync: &Synchronizer) {
    let cart = sync.cart();
    if cart.is_empty() {
        info!("Your cart is empty");
        return;
    }

    for line in cart.items() {
        info!(
            "{:<16} {:<32} {:>3} x {:>8} = {:>10}",
            line.id,
            line.name,
            line.quantity,
            line.unit_price.display(),
            line.line_total().display()
        );
    }

    let summary = sync.summary(ctx.config.shipping_fee);
    info!("Items:    {}", summary.unit_count);
    info!("Subtotal: {}", summary.subtotal.display());
    info!("Shipping: {}", summary.shipping.display());
    info!("Total:    {}", summary.total.display());
}
