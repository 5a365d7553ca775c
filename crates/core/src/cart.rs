//! The cart and the pure operations over it.
//!
//! Every operation consumes the cart and returns the next one. None of them
//! can fail and none of them touch I/O, so the same inputs always produce an
//! equal cart. Two invariants hold after every operation:
//!
//! - no line has a quantity below 1 (it is removed instead)
//! - no two lines share a [`ProductId`] (a repeated add bumps the quantity)

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{LineItem, Price, Product, ProductId};

/// Direction of a single-step quantity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    Increase,
    Decrease,
}

/// Ordered, id-unique list of line items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    items: Vec<LineItem>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from untrusted lines (e.g. a stored payload).
    ///
    /// Lines with quantity 0 are dropped and repeated ids are merged into the
    /// first occurrence by summing quantities, so the result always satisfies
    /// the cart invariants.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = LineItem>) -> Self {
        let mut merged: Vec<LineItem> = Vec::new();
        for item in items {
            if item.quantity == 0 {
                continue;
            }
            match merged.iter_mut().find(|existing| existing.id == item.id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(item.quantity);
                }
                None => merged.push(item),
            }
        }
        Self { items: merged }
    }

    /// Add one unit of `product`.
    ///
    /// Increments the existing line when the id is already present, otherwise
    /// appends a new line with quantity 1.
    #[must_use]
    pub fn add_item(mut self, product: &Product) -> Self {
        match self.items.iter_mut().find(|item| item.id == product.id) {
            Some(item) => item.quantity = item.quantity.saturating_add(1),
            None => self.items.push(LineItem::from_product(product)),
        }
        self
    }

    /// Delete the line for `id` regardless of its quantity.
    #[must_use]
    pub fn remove_item(mut self, id: &ProductId) -> Self {
        self.items.retain(|item| &item.id != id);
        self
    }

    /// Apply a +1 / -1 step to the line for `id`.
    ///
    /// A line whose quantity would drop below 1 is removed. Unknown ids leave
    /// the cart unchanged.
    #[must_use]
    pub fn change_quantity(mut self, id: &ProductId, change: QuantityChange) -> Self {
        let Some(position) = self.items.iter().position(|item| &item.id == id) else {
            return self;
        };

        match change {
            QuantityChange::Increase => {
                if let Some(item) = self.items.get_mut(position) {
                    item.quantity = item.quantity.saturating_add(1);
                }
            }
            QuantityChange::Decrease => {
                let remaining = self
                    .items
                    .get(position)
                    .map_or(0, |item| item.quantity.saturating_sub(1));
                if remaining < 1 {
                    self.items.remove(position);
                } else if let Some(item) = self.items.get_mut(position) {
                    item.quantity = remaining;
                }
            }
        }
        self
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Look up a line by product id.
    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&LineItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct lines (what the cart badge shows).
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn unit_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of `unit_price × quantity`. Recomputed on every call.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.items.iter().map(LineItem::line_total).sum()
    }

    /// Totals for the checkout box, with a flat shipping fee.
    ///
    /// An empty cart is never charged shipping.
    #[must_use]
    pub fn summary(&self, shipping: Price) -> CartSummary {
        let subtotal = self.subtotal();
        let shipping = if self.is_empty() { Price::ZERO } else { shipping };
        CartSummary {
            line_count: self.len(),
            unit_count: self.unit_count(),
            subtotal,
            shipping,
            total: subtotal + shipping,
        }
    }
}

impl From<Vec<LineItem>> for Cart {
    fn from(items: Vec<LineItem>) -> Self {
        Self::from_items(items)
    }
}

impl Serialize for Cart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Cart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<LineItem>::deserialize(deserializer).map(Self::from_items)
    }
}

/// Derived totals for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartSummary {
    pub line_count: usize,
    pub unit_count: u64,
    pub subtotal: Price,
    pub shipping: Price,
    pub total: Price,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn product(id: &str, cents: u32) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Card {id}"),
            unit_price: Price::from_cents(cents),
            description: "Scarlet & Violet".to_string(),
            image_url: None,
        }
    }

    fn assert_invariants(cart: &Cart) {
        for (i, a) in cart.items().iter().enumerate() {
            assert!(a.quantity >= 1, "line {} has quantity {}", a.id, a.quantity);
            for b in &cart.items()[i + 1..] {
                assert_ne!(a.id, b.id, "duplicate id {}", a.id);
            }
        }
    }

    #[test]
    fn test_add_same_product_twice_increments_quantity() {
        let pikachu = product("sv4-25", 1000);
        let cart = Cart::new().add_item(&pikachu).add_item(&pikachu);

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.items()[0].quantity, 2);
    }

    #[test]
    fn test_add_preserves_insertion_order() {
        let a = product("a", 100);
        let b = product("b", 200);
        let c = product("c", 300);
        let cart = Cart::new().add_item(&a).add_item(&b).add_item(&c).add_item(&a);

        let ids: Vec<_> = cart.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(cart.get(&ProductId::new("a")).unwrap().quantity, 2);
    }

    #[test]
    fn test_remove_deletes_whole_line() {
        let a = product("a", 100);
        let cart = Cart::new().add_item(&a).add_item(&a).add_item(&a);
        let cart = cart.remove_item(&a.id);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_decrease_at_one_removes_line() {
        let a = product("a", 100);
        let b = product("b", 200);
        let cart = Cart::new().add_item(&a).add_item(&b);
        let cart = cart.change_quantity(&a.id, QuantityChange::Decrease);

        assert_eq!(cart.len(), 1);
        assert!(cart.get(&a.id).is_none());
    }

    #[test]
    fn test_increase_and_decrease() {
        let a = product("a", 100);
        let cart = Cart::new()
            .add_item(&a)
            .change_quantity(&a.id, QuantityChange::Increase)
            .change_quantity(&a.id, QuantityChange::Increase)
            .change_quantity(&a.id, QuantityChange::Decrease);
        assert_eq!(cart.get(&a.id).unwrap().quantity, 2);
    }

    #[test]
    fn test_change_quantity_unknown_id_is_noop() {
        let a = product("a", 100);
        let cart = Cart::new().add_item(&a);
        let after = cart
            .clone()
            .change_quantity(&ProductId::new("missing"), QuantityChange::Decrease);
        assert_eq!(after, cart);
    }

    #[test]
    fn test_operations_are_referentially_transparent() {
        let a = product("a", 100);
        let b = product("b", 250);
        let start = Cart::new().add_item(&a);

        let first = start.clone().add_item(&b).remove_item(&a.id);
        let second = start.add_item(&b).remove_item(&a.id);
        assert_eq!(first, second);
    }

    #[test]
    fn test_invariants_hold_over_operation_sequences() {
        let products: Vec<_> = (0..4).map(|i| product(&format!("p{i}"), 100 * i)).collect();
        let mut cart = Cart::new();

        // Deterministic pseudo-random walk over all three operations.
        let mut seed: u32 = 7;
        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let p = &products[(seed >> 8) as usize % products.len()];
            cart = match (seed >> 4) % 4 {
                0 => cart.add_item(p),
                1 => cart.remove_item(&p.id),
                2 => cart.change_quantity(&p.id, QuantityChange::Increase),
                _ => cart.change_quantity(&p.id, QuantityChange::Decrease),
            };
            assert_invariants(&cart);
        }
    }

    #[test]
    fn test_subtotal_and_summary() {
        let a = product("a", 1050);
        let b = product("b", 299);
        let cart = Cart::new().add_item(&a).add_item(&a).add_item(&b);

        assert_eq!(cart.subtotal(), Price::from_cents(2399));

        let summary = cart.summary(Price::from_cents(2000));
        assert_eq!(summary.line_count, 2);
        assert_eq!(summary.unit_count, 3);
        assert_eq!(summary.total, Price::from_cents(4399));
    }

    #[test]
    fn test_empty_cart_has_no_shipping() {
        let summary = Cart::new().summary(Price::from_cents(2000));
        assert_eq!(summary.shipping, Price::ZERO);
        assert_eq!(summary.total, Price::ZERO);
    }

    #[test]
    fn test_from_items_drops_zero_and_merges_duplicates() {
        let mut line = LineItem::from_product(&product("a", 100));
        let mut zero = LineItem::from_product(&product("b", 100));
        zero.quantity = 0;
        let mut again = line.clone();
        again.quantity = 3;
        line.quantity = 2;

        let cart = Cart::from_items([line, zero, again]);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.items()[0].quantity, 5);
    }

    #[test]
    fn test_cart_payload_matches_stored_format() {
        let cart = Cart::new().add_item(&product("sv4-25", 1000));
        let json = serde_json::to_value(&cart).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "id": "sv4-25",
                "name": "Card sv4-25",
                "price": 10.0,
                "description": "Scarlet & Violet",
                "quantity": 1
            }])
        );

        let back: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(back, cart);
    }
}
