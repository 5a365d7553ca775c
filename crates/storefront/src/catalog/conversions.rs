//! Normalization of upstream catalog records into [`Product`].
//!
//! Upstream shapes are loose: any nested field may be missing and prices may
//! be numbers, numeric strings, zero or absent. A record without a usable
//! price still lists, with the source's fallback price.

use std::str::FromStr;

use pokebolsa_core::{Price, Product, ProductId};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Description used when a card has no set name.
pub const UNKNOWN_SET_DESCRIPTION: &str = "Pokémon collection";

/// Fallback for cards without a market price.
#[must_use]
pub fn card_fallback_price() -> Price {
    Price::from_cents(1000)
}

/// Fallback for store products without a price.
#[must_use]
pub const fn product_fallback_price() -> Price {
    Price::ZERO
}

// =============================================================================
// Card search API
// =============================================================================

/// `GET <catalog-url>` envelope. `data` is kept loose so a malformed body
/// yields an empty listing instead of an error.
#[derive(Debug, Deserialize)]
pub struct CardSearchResponse {
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CardRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub set: Option<CardSet>,
    #[serde(default)]
    pub images: Option<CardImages>,
    #[serde(default)]
    pub tcgplayer: Option<TcgPlayer>,
}

#[derive(Debug, Deserialize)]
pub struct CardSet {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CardImages {
    pub small: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TcgPlayer {
    pub prices: Option<TcgPrices>,
}

#[derive(Debug, Deserialize)]
pub struct TcgPrices {
    pub holofoil: Option<PriceBand>,
}

#[derive(Debug, Deserialize)]
pub struct PriceBand {
    pub low: Option<serde_json::Value>,
}

impl CardRecord {
    fn market_low(&self) -> Option<&serde_json::Value> {
        self.tcgplayer
            .as_ref()?
            .prices
            .as_ref()?
            .holofoil
            .as_ref()?
            .low
            .as_ref()
    }
}

pub fn convert_card(card: CardRecord) -> Product {
    let unit_price = usable_price(card.market_low()).unwrap_or_else(card_fallback_price);
    Product {
        id: ProductId::new(card.id),
        name: card.name,
        unit_price,
        description: card
            .set
            .and_then(|set| set.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_SET_DESCRIPTION.to_string()),
        image_url: card.images.and_then(|images| images.small),
    }
}

pub fn convert_card_response(response: CardSearchResponse) -> Vec<Product> {
    decode_records::<CardRecord>(response.data, "card")
        .into_iter()
        .map(convert_card)
        .collect()
}

// =============================================================================
// Parse `Product` class
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductObject {
    pub object_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

pub fn convert_product_object(object: ProductObject) -> Product {
    Product {
        id: ProductId::new(object.object_id),
        name: object.name.unwrap_or_default(),
        unit_price: usable_price(object.price.as_ref()).unwrap_or_else(product_fallback_price),
        description: object.description.unwrap_or_default(),
        image_url: None,
    }
}

pub fn convert_product_objects(objects: Vec<serde_json::Value>) -> Vec<Product> {
    decode_records::<ProductObject>(serde_json::Value::Array(objects), "product")
        .into_iter()
        .map(convert_product_object)
        .collect()
}

// =============================================================================
// Helpers
// =============================================================================

/// A finite, strictly positive number or numeric string.
pub fn usable_price(value: Option<&serde_json::Value>) -> Option<Price> {
    let amount = match value? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .and_then(Decimal::from_f64)?,
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok()?,
        _ => return None,
    };

    if amount <= Decimal::ZERO {
        return None;
    }
    Price::new(amount).ok()
}

/// Decode each element of a JSON array on its own, skipping bad records.
fn decode_records<T: DeserializeOwned>(data: serde_json::Value, kind: &str) -> Vec<T> {
    let serde_json::Value::Array(values) = data else {
        return Vec::new();
    };

    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(kind, error = %e, "Skipping malformed catalog record");
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_full_card_record() {
        let response: CardSearchResponse = serde_json::from_value(json!({
            "data": [{
                "id": "xy1-1",
                "name": "Venusaur-EX",
                "set": { "name": "XY" },
                "images": { "small": "https://images.test/xy1-1.png" },
                "tcgplayer": { "prices": { "holofoil": { "low": 4.99 } } }
            }]
        }))
        .unwrap();

        let products = convert_card_response(response);
        assert_eq!(products.len(), 1);
        let card = &products[0];
        assert_eq!(card.id.as_str(), "xy1-1");
        assert_eq!(card.description, "XY");
        assert_eq!(card.unit_price, Price::from_cents(499));
        assert_eq!(card.image_url.as_deref(), Some("https://images.test/xy1-1.png"));
    }

    #[test]
    fn test_card_without_optional_fields_uses_fallbacks() {
        let response: CardSearchResponse = serde_json::from_value(json!({
            "data": [{ "id": "me1-7", "name": "Mega Lucario ex" }]
        }))
        .unwrap();

        let card = &convert_card_response(response)[0];
        assert_eq!(card.unit_price, card_fallback_price());
        assert_eq!(card.description, UNKNOWN_SET_DESCRIPTION);
        assert!(card.image_url.is_none());
    }

    #[test]
    fn test_card_with_partial_price_path() {
        let response: CardSearchResponse = serde_json::from_value(json!({
            "data": [{ "id": "a", "name": "A", "tcgplayer": { "prices": { "normal": { "low": 1.0 } } } }]
        }))
        .unwrap();
        assert_eq!(
            convert_card_response(response)[0].unit_price,
            card_fallback_price()
        );
    }

    #[test]
    fn test_non_array_data_is_empty() {
        let response: CardSearchResponse =
            serde_json::from_value(json!({ "error": "boom" })).unwrap();
        assert!(convert_card_response(response).is_empty());
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let response: CardSearchResponse = serde_json::from_value(json!({
            "data": [{ "name": "no id" }, { "id": "ok", "name": "Ok" }]
        }))
        .unwrap();
        let products = convert_card_response(response);
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id.as_str(), "ok");
    }

    #[test]
    fn test_product_object_conversion() {
        let products = convert_product_objects(vec![
            json!({ "objectId": "p1", "name": "Booster", "price": 29.9, "description": "Sealed" }),
            json!({ "objectId": "p2", "name": "Sleeves" }),
        ]);

        assert_eq!(products[0].unit_price, Price::from_cents(2990));
        assert_eq!(products[1].unit_price, Price::ZERO);
        assert_eq!(products[1].description, "");
    }

    #[test]
    fn test_usable_price_rules() {
        assert_eq!(usable_price(Some(&json!("12.30"))), Some(Price::from_cents(1230)));
        assert_eq!(usable_price(Some(&json!(0))), None);
        assert_eq!(usable_price(Some(&json!(-3.5))), None);
        assert_eq!(usable_price(Some(&json!("n/a"))), None);
        assert_eq!(usable_price(Some(&json!(null))), None);
        assert_eq!(usable_price(None), None);
    }
}
