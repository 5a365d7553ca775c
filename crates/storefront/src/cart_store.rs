//! Remote cart persistence.
//!
//! One remote record per session holds the whole cart, serialized. There are
//! no partial updates: every write sends the full current cart.

use async_trait::async_trait;
use pokebolsa_core::{Cart, RecordId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument};

use crate::parse::{ParseClient, ParseError};

/// Parse class holding cart records.
pub const CART_CLASS: &str = "CartSession";

/// A create or update of the cart record failed.
///
/// Never rolls back the local cart.
#[derive(Debug, Error)]
pub enum RemoteWriteError {
    #[error("remote store rejected cart write: {0}")]
    Store(#[from] ParseError),

    #[error("cart payload could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("remote store did not return an object id")]
    MissingObjectId,

    #[error("remote store unavailable: {0}")]
    Unavailable(String),
}

/// The remote shadow copy of a session's cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCartRecord {
    pub record_id: RecordId,
    pub session_id: SessionId,
    pub cart: Cart,
}

/// Read failures while looking up a cart record.
#[derive(Debug, Error)]
pub enum CartReadError {
    #[error("remote store query failed: {0}")]
    Store(#[from] ParseError),

    #[error("cart payload is not a valid cart: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("remote store unavailable: {0}")]
    Unavailable(String),
}

/// Capabilities the cart synchronizer needs from a backend.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The record for `session_id`, if one exists.
    ///
    /// When several match, the first one the store returns wins.
    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<RemoteCartRecord>, CartReadError>;

    /// Create the record and return the id the store assigned.
    async fn create(&self, session_id: &SessionId, cart: &Cart)
    -> Result<RecordId, RemoteWriteError>;

    /// Replace the stored cart of an existing record.
    async fn update(&self, record_id: &RecordId, cart: &Cart) -> Result<(), RemoteWriteError>;
}

// =============================================================================
// ParseCartStore
// =============================================================================

/// Stored shape of a `CartSession` object.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartSessionObject {
    object_id: String,
    session_id: String,
    /// JSON-encoded list of line items.
    #[serde(default)]
    items: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CartSessionPayload<'a> {
    session_id: &'a str,
    items: String,
}

/// [`CartStore`] backed by the Parse `CartSession` class.
#[derive(Debug, Clone)]
pub struct ParseCartStore {
    client: ParseClient,
}

impl ParseCartStore {
    #[must_use]
    pub const fn new(client: ParseClient) -> Self {
        Self { client }
    }

    fn payload<'a>(
        session_id: &'a SessionId,
        cart: &Cart,
    ) -> Result<CartSessionPayload<'a>, RemoteWriteError> {
        Ok(CartSessionPayload {
            session_id: session_id.as_str(),
            items: serde_json::to_string(cart).map_err(RemoteWriteError::Encode)?,
        })
    }

    /// Delete a cart record. Not used by the synchronizer.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote delete fails.
    pub async fn delete(&self, record_id: &RecordId) -> Result<(), ParseError> {
        self.client.delete(CART_CLASS, record_id.as_str()).await
    }
}

#[async_trait]
impl CartStore for ParseCartStore {
    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<RemoteCartRecord>, CartReadError> {
        let filter = json!({ "sessionId": session_id.as_str() });
        let objects: Vec<CartSessionObject> =
            self.client.query(CART_CLASS, Some(&filter)).await?;

        let Some(object) = objects.into_iter().next() else {
            return Ok(None);
        };

        let cart = match object.items.as_deref() {
            None | Some("") => Cart::new(),
            Some(items) => serde_json::from_str(items).map_err(CartReadError::Decode)?,
        };

        Ok(Some(RemoteCartRecord {
            record_id: RecordId::new(object.object_id),
            session_id: SessionId::new(object.session_id),
            cart,
        }))
    }

    #[instrument(skip(self, cart), fields(session_id = %session_id, lines = cart.len()))]
    async fn create(
        &self,
        session_id: &SessionId,
        cart: &Cart,
    ) -> Result<RecordId, RemoteWriteError> {
        let created = self
            .client
            .create(CART_CLASS, &Self::payload(session_id, cart)?)
            .await?;

        let record_id = created
            .object_id
            .filter(|id| !id.is_empty())
            .map(RecordId::new)
            .ok_or(RemoteWriteError::MissingObjectId)?;
        info!(record_id = %record_id, "Cart record created");
        Ok(record_id)
    }

    #[instrument(skip(self, cart), fields(record_id = %record_id, lines = cart.len()))]
    async fn update(&self, record_id: &RecordId, cart: &Cart) -> Result<(), RemoteWriteError> {
        let items = serde_json::to_string(cart).map_err(RemoteWriteError::Encode)?;
        self.client
            .update(CART_CLASS, record_id.as_str(), &json!({ "items": items }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_session_object_with_items() {
        let object: CartSessionObject = serde_json::from_value(json!({
            "objectId": "Xy12",
            "sessionId": "sess_1_abc",
            "items": "[{\"id\":\"a\",\"name\":\"A\",\"price\":2.5,\"description\":\"\",\"quantity\":2}]",
            "createdAt": "2024-05-01T00:00:00.000Z"
        }))
        .unwrap();

        let cart: Cart = serde_json::from_str(object.items.as_deref().unwrap()).unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.unit_count(), 2);
    }

    #[test]
    fn test_payload_encodes_items_as_string() {
        let session = SessionId::new("sess_1_abc");
        let payload = ParseCartStore::payload(&session, &Cart::new()).unwrap();
        let value = serde_json::to_value(payload).unwrap();
        assert_eq!(value, json!({ "sessionId": "sess_1_abc", "items": "[]" }));
    }
}
