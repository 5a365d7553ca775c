//! Anonymous session identity.
//!
//! Each installation gets one session id the first time it asks for one. The
//! id is persisted before it is handed out and is never rotated or deleted
//! here, so every later call returns the same value.

use chrono::Utc;
use pokebolsa_core::SessionId;
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{debug, info};

use crate::storage::{KeyValueStore, StorageError, keys};

/// Length of the random part of a generated id.
const SUFFIX_LEN: usize = 11;

/// Produces and persists the per-installation [`SessionId`].
#[derive(Debug, Clone)]
pub struct SessionIdentity<K> {
    storage: K,
}

impl<K: KeyValueStore> SessionIdentity<K> {
    pub const fn new(storage: K) -> Self {
        Self { storage }
    }

    /// Return the stored session id, creating and storing one if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store cannot be read or written.
    pub async fn get_or_create(&self) -> Result<SessionId, StorageError> {
        if let Some(existing) = self.storage.get(keys::SESSION_ID).await?
            && !existing.is_empty()
        {
            debug!(session_id = %existing, "Reusing stored session id");
            return Ok(SessionId::new(existing));
        }

        let session_id = generate_session_id();
        self.storage
            .set(keys::SESSION_ID, session_id.as_str())
            .await?;
        info!(session_id = %session_id, "Created new session id");
        Ok(session_id)
    }
}

/// `sess_<unix millis>_<random lowercase alphanumerics>`.
///
/// Not a credential: the random suffix only has to make collisions between
/// installs created in the same millisecond negligible.
#[must_use]
pub fn generate_session_id() -> SessionId {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    SessionId::new(format!("sess_{}_{suffix}", Utc::now().timestamp_millis()))
}
