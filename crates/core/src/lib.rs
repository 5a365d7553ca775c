//! Pokébolsa Core - Shared cart and catalog types.
//!
//! This crate provides the types every Pokébolsa component agrees on:
//! - `storefront` - Session identity, remote persistence and catalog adapters
//! - `cli` - The shell that drives the storefront library
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no timers. The cart reducer lives here so it can be tested without
//! a runtime and reused by any front end.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids and prices, plus product/line shapes
//! - [`cart`] - The [`Cart`] and its add/remove/change-quantity operations

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod types;

pub use cart::{Cart, CartSummary, QuantityChange};
pub use types::*;
