//! Cart synchronizer.
//!
//! Owns the in-memory cart for one session and mirrors it to the remote
//! [`CartStore`]. Lifecycle:
//!
//! ```text
//! UNINITIALIZED --load--> LOADING --(hydrated | load failed)--> READY
//! READY --mutation--> SAVE_PENDING --(quiet period, save done or failed)--> READY
//! SAVE_PENDING --mutation--> SAVE_PENDING (timer restarted)
//! ```
//!
//! The local cart is the source of truth for the running session. A failed
//! save is reported on the notice channel and never rolls the cart back.
//! Hydration itself never triggers a save.

mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use pokebolsa_core::{
    Cart, CartSummary, Price, Product, ProductId, QuantityChange, RecordId, SessionId,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use crate::cart_store::{CartReadError, CartStore};
use crate::session::{SessionIdentity, generate_session_id};
use crate::storage::{KeyValueStore, StorageError};

use self::scheduler::SaveScheduler;

/// Default quiet period before a save.
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Notices kept for a reader; later ones are dropped until it catches up.
pub const NOTICE_BUFFER: usize = 32;

/// Where the synchronizer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Loading,
    Ready,
    SavePending,
}

/// Observable state plus the remote record id once known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub state: SyncState,
    pub record_id: Option<RecordId>,
}

/// Outcome of a background save, for user-facing feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    Created(RecordId),
    Updated(RecordId),
    SaveFailed { message: String },
}

/// Anything that went wrong while hydrating. Logged, never surfaced.
#[derive(Debug, Error)]
pub enum SessionLoadError {
    #[error("session id unavailable: {0}")]
    Session(#[from] StorageError),

    #[error("cart lookup failed: {0}")]
    Remote(#[from] CartReadError),
}

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub debounce: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_SAVE_DEBOUNCE,
        }
    }
}

/// Session cart with debounced remote persistence.
pub struct CartSynchronizer<S: ?Sized> {
    store: Arc<S>,
    options: SyncOptions,
    cart: Cart,
    session_id: Option<SessionId>,
    status: Arc<watch::Sender<SyncStatus>>,
    scheduler: Option<SaveScheduler>,
    notices_tx: mpsc::Sender<SyncNotice>,
    notices_rx: Option<mpsc::Receiver<SyncNotice>>,
}

impl<S> CartSynchronizer<S>
where
    S: CartStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, options: SyncOptions) -> Self {
        let (status, _) = watch::channel(SyncStatus {
            state: SyncState::Uninitialized,
            record_id: None,
        });
        let (notices_tx, notices_rx) = mpsc::channel(NOTICE_BUFFER);

        Self {
            store,
            options,
            cart: Cart::new(),
            session_id: None,
            status: Arc::new(status),
            scheduler: None,
            notices_tx,
            notices_rx: Some(notices_rx),
        }
    }

    /// Resolve the session and hydrate the cart from the remote record.
    ///
    /// Always ends in READY. When the session id or the remote lookup fails
    /// the cart starts empty and the first save creates a new record.
    #[instrument(skip_all)]
    pub async fn load<K: KeyValueStore>(&mut self, identity: &SessionIdentity<K>) {
        if let Some(previous) = self.scheduler.take() {
            previous.stop().await;
        }
        self.set_state(SyncState::Loading);

        let session_id = match identity.get_or_create().await {
            Ok(id) => id,
            Err(e) => {
                let error = SessionLoadError::from(e);
                warn!(error = %error, "Using a temporary session id");
                generate_session_id()
            }
        };

        let (record_id, cart) = match self.hydrate(&session_id).await {
            Ok(Some((record_id, cart))) => {
                info!(
                    session_id = %session_id,
                    record_id = %record_id,
                    lines = cart.len(),
                    "Cart hydrated"
                );
                (Some(record_id), cart)
            }
            Ok(None) => {
                debug!(session_id = %session_id, "No remote cart for session");
                (None, Cart::new())
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Cart hydration failed, starting empty");
                (None, Cart::new())
            }
        };

        self.cart = cart.clone();
        self.scheduler = Some(SaveScheduler::start(
            Arc::clone(&self.store),
            session_id.clone(),
            record_id.clone(),
            cart,
            self.options.debounce,
            Arc::clone(&self.status),
            self.notices_tx.clone(),
        ));
        self.session_id = Some(session_id);
        self.status.send_replace(SyncStatus {
            state: SyncState::Ready,
            record_id,
        });
    }

    async fn hydrate(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<(RecordId, Cart)>, SessionLoadError> {
        let record = self.store.find_by_session(session_id).await?;
        Ok(record.map(|record| {
            // Stored carts from older clients may carry zero quantities or
            // duplicate lines.
            let cart = Cart::from_items(record.cart.items().to_vec());
            (record.record_id, cart)
        }))
    }

    fn set_state(&self, state: SyncState) {
        self.status.send_modify(|status| status.state = state);
    }

    pub fn add_item(&mut self, product: &Product) {
        self.apply(|cart| cart.add_item(product));
    }

    pub fn remove_item(&mut self, id: &ProductId) {
        self.apply(|cart| cart.remove_item(id));
    }

    pub fn change_quantity(&mut self, id: &ProductId, change: QuantityChange) {
        self.apply(|cart| cart.change_quantity(id, change));
    }

    /// Apply a reducer step and schedule a save.
    ///
    /// Before [`Self::load`] the change is local only; hydration replaces it.
    fn apply(&mut self, step: impl FnOnce(Cart) -> Cart) {
        self.cart = step(std::mem::take(&mut self.cart));

        if let Some(scheduler) = &self.scheduler {
            scheduler.schedule(self.cart.clone());
        }
    }

    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    #[must_use]
    pub fn summary(&self, shipping: Price) -> CartSummary {
        self.cart.summary(shipping)
    }

    #[must_use]
    pub const fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Take the notice receiver. Only the first call gets it.
    ///
    /// Holds at most [`NOTICE_BUFFER`] unread notices.
    pub fn take_notices(&mut self) -> Option<mpsc::Receiver<SyncNotice>> {
        self.notices_rx.take()
    }

    /// Wait until no save is pending.
    pub async fn settled(&self) {
        if self.scheduler.is_none() {
            return;
        }
        let mut status = self.status.subscribe();
        // The sender lives in `self`, so this only ends on a matching state.
        let _ = status
            .wait_for(|status| status.state == SyncState::Ready)
            .await;
    }

    /// Cancel any pending save and stop the save worker.
    ///
    /// A save already in flight is abandoned; the local cart is unchanged.
    pub async fn shutdown(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop().await;
            debug!("Cart synchronizer stopped");
        }
    }
}
