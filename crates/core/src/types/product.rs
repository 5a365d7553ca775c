//! Catalog product and cart line item shapes.

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::price::Price;

/// A catalog entry normalized from any upstream source.
///
/// This is a [`LineItem`] without a quantity: what the shopper sees in the
/// listing before adding anything to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Stable identifier from the upstream catalog.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Price of a single unit.
    pub unit_price: Price,
    /// Free text shown under the name.
    pub description: String,
    /// Thumbnail, when the upstream record has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// One entry in a cart.
///
/// Field names match the `items` payload stored in the remote cart record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: ProductId,
    pub name: String,
    #[serde(rename = "price")]
    pub unit_price: Price,
    #[serde(default)]
    pub description: String,
    /// Always at least 1 inside a [`crate::Cart`].
    pub quantity: u32,
}

impl LineItem {
    /// Start a line for `product` with quantity 1.
    #[must_use]
    pub fn from_product(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            name: product.name.clone(),
            unit_price: product.unit_price,
            description: product.description.clone(),
            quantity: 1,
        }
    }

    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price * self.quantity
    }
}
