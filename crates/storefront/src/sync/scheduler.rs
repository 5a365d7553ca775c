//! Debounced, serialized cart saves.
//!
//! A single worker task owns the remote record id and performs every save.
//! [`SaveScheduler::schedule`] replaces the pending cart and restarts the
//! quiet-period timer, so a burst of mutations produces one save carrying the
//! last cart. Saves never overlap: a mutation that lands while a save is in
//! flight starts a fresh debounce cycle once that save finishes.

use std::sync::Arc;
use std::time::Duration;

use pokebolsa_core::{Cart, RecordId, SessionId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{SyncNotice, SyncState, SyncStatus};
use crate::cart_store::CartStore;

/// Handle to the save worker.
#[derive(Debug)]
pub(crate) struct SaveScheduler {
    pending: watch::Sender<Cart>,
    status: Arc<watch::Sender<SyncStatus>>,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl SaveScheduler {
    /// Spawn the worker. `cart` is the hydrated cart; it is not saved.
    pub(crate) fn start<S>(
        store: Arc<S>,
        session_id: SessionId,
        record_id: Option<RecordId>,
        cart: Cart,
        debounce: Duration,
        status: Arc<watch::Sender<SyncStatus>>,
        notices: mpsc::Sender<SyncNotice>,
    ) -> Self
    where
        S: CartStore + ?Sized + 'static,
    {
        let (pending, receiver) = watch::channel(cart);
        let cancel = CancellationToken::new();

        let worker = SaveWorker {
            store,
            session_id,
            record_id,
            debounce,
            pending: receiver,
            status: Arc::clone(&status),
            notices,
        };
        let worker = tokio::spawn(worker.run(cancel.clone()));

        Self {
            pending,
            status,
            cancel,
            worker,
        }
    }

    /// Make `cart` the next thing to save and restart the timer.
    ///
    /// SAVE_PENDING and the hand-off happen in one status update.
    pub(crate) fn schedule(&self, cart: Cart) {
        self.status.send_modify(|status| {
            status.state = SyncState::SavePending;
            self.pending.send_replace(cart);
        });
    }

    /// Drop the pending save and stop the worker.
    pub(crate) async fn stop(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.worker).await
            && e.is_panic()
        {
            warn!(error = %e, "Cart save worker panicked");
        }
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SaveWorker<S: ?Sized> {
    store: Arc<S>,
    session_id: SessionId,
    record_id: Option<RecordId>,
    debounce: Duration,
    pending: watch::Receiver<Cart>,
    status: Arc<watch::Sender<SyncStatus>>,
    notices: mpsc::Sender<SyncNotice>,
}

impl<S: CartStore + ?Sized> SaveWorker<S> {
    async fn run(mut self, cancel: CancellationToken) {
        let debounce = self.debounce;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                changed = self.pending.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }

            // Quiet period; every further change restarts it.
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    changed = self.pending.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        debug!("Cart changed again, restarting save timer");
                    }
                    () = tokio::time::sleep(debounce) => break,
                }
            }

            let cart = self.pending.borrow_and_update().clone();
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = self.save(&cart) => {}
            }

            let pending = &self.pending;
            self.status.send_modify(|status| {
                if status.state == SyncState::SavePending
                    && !pending.has_changed().unwrap_or(false)
                {
                    status.state = SyncState::Ready;
                }
            });
        }
    }

    /// Update the known record, or create one and remember its id.
    async fn save(&mut self, cart: &Cart) {
        let outcome = if let Some(record_id) = self.record_id.clone() {
            self.store
                .update(&record_id, cart)
                .await
                .map(|()| SyncNotice::Updated(record_id))
        } else {
            match self.store.create(&self.session_id, cart).await {
                Ok(record_id) => {
                    self.record_id = Some(record_id.clone());
                    self.status.send_modify(|status| {
                        status.record_id = Some(record_id.clone());
                    });
                    Ok(SyncNotice::Created(record_id))
                }
                Err(e) => Err(e),
            }
        };

        let notice = match outcome {
            Ok(notice) => {
                info!(lines = cart.len(), notice = ?notice, "Cart saved");
                notice
            }
            Err(e) => {
                warn!(
                    session_id = %self.session_id,
                    error = %e,
                    "Cart save failed, keeping local cart"
                );
                SyncNotice::SaveFailed {
                    message: e.to_string(),
                }
            }
        };

        // Nobody reading, or a full buffer, drops the notice.
        if let Err(e) = self.notices.try_send(notice) {
            debug!(error = %e, "Sync notice dropped");
        }
    }
}
