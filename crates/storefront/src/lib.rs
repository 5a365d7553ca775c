//! Pokébolsa storefront library.
//!
//! Session identity, the Parse-backed cart store, the debounced cart
//! synchronizer, the catalog adapter and customer accounts. The CLI crate is
//! a thin shell over this library.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod account;
pub mod cart_store;
pub mod catalog;
pub mod config;
pub mod error;
pub mod parse;
pub mod session;
pub mod storage;
pub mod sync;

pub use account::{Account, AccountService, AuthError, ValidationError};
pub use cart_store::{CartStore, ParseCartStore, RemoteCartRecord, RemoteWriteError};
pub use catalog::{Catalog, CatalogError, CatalogListing, CatalogSource, ListingState, RetryPolicy};
pub use config::StoreConfig;
pub use error::AppError;
pub use parse::ParseClient;
pub use session::SessionIdentity;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use sync::{CartSynchronizer, SyncNotice, SyncOptions, SyncState, SyncStatus};
