//! Background cart persistence.
//!
//! Writes are fire-and-forget from the shopper's point of view: a mutation
//! enqueues the full cart and the response goes out without waiting.
//!
//! Commands are spread over a fixed set of worker lanes by identity. Each
//! lane drains its queue in order, so writes for an identity land in the
//! order they were made, and a page-load read queued after a write sees that
//! write. Identities on different lanes never wait for each other. Every
//! store call is bounded by a timeout, so a hung request frees its lane.
//!
//! Failures are logged by the worker and otherwise dropped. Callers that care
//! (tests, the CLI) can await the [`SaveHandle`] returned by [`CartSync::save`].

use std::future::Future;
use std::hash::{BuildHasher, RandomState};
use std::sync::Arc;
use std::time::Duration;

use cartwheel_core::{Cart, UserId};
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, error, info, info_span};

use crate::store::{CartStore, StoreError, StoreOperation};

/// Tuning for [`CartSync`].
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Number of worker lanes. At least one is always spawned.
    pub lanes: usize,
    /// Commands buffered per lane before `save`/`load` wait for room.
    pub queue_capacity: usize,
    /// Longest a single store call may run before it is abandoned.
    pub call_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            lanes: 16,
            queue_capacity: 256,
            call_timeout: Duration::from_secs(15),
        }
    }
}

enum Command {
    Save {
        user_id: UserId,
        cart: Cart,
        done: oneshot::Sender<Result<(), StoreError>>,
    },
    Load {
        user_id: UserId,
        reply: oneshot::Sender<Result<Cart, StoreError>>,
    },
}

/// Completion of a queued save.
///
/// Dropping the handle doesn't cancel the write.
#[must_use = "drop the handle explicitly to persist in the background"]
pub struct SaveHandle {
    rx: oneshot::Receiver<Result<(), StoreError>>,
}

impl SaveHandle {
    /// Wait for the write to finish.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or a save error if the worker has stopped.
    pub async fn outcome(self) -> Result<(), StoreError> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(worker_stopped(StoreOperation::Save)))
    }

    /// Let the write finish in the background.
    pub fn detach(self) {}
}

fn worker_stopped(operation: StoreOperation) -> StoreError {
    StoreError::new(operation, "cart sync worker stopped")
}

/// Handle to the ordered persistence workers.
#[derive(Clone)]
pub struct CartSync {
    lanes: Arc<[mpsc::Sender<Command>]>,
    hasher: RandomState,
}

impl CartSync {
    /// Spawn the workers with default options on the current Tokio runtime.
    #[must_use]
    pub fn spawn(store: Arc<dyn CartStore>) -> Self {
        Self::spawn_with(store, SyncOptions::default())
    }

    /// Spawn the workers on the current Tokio runtime.
    #[must_use]
    pub fn spawn_with(store: Arc<dyn CartStore>, options: SyncOptions) -> Self {
        let lane_count = options.lanes.max(1);
        info!(
            lanes = lane_count,
            queue_capacity = options.queue_capacity,
            "Spawning cart sync workers"
        );
        let lanes = (0..lane_count)
            .map(|lane| {
                let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
                let worker = run_worker(Arc::clone(&store), rx, options.call_timeout);
                tokio::spawn(worker.instrument(info_span!("cart_sync", lane)));
                tx
            })
            .collect();
        Self {
            lanes,
            hasher: RandomState::new(),
        }
    }

    /// Lane that owns `user_id`. Stable for the lifetime of this handle.
    fn lane_index(&self, user_id: &UserId) -> usize {
        let len = u64::try_from(self.lanes.len()).unwrap_or(1).max(1);
        let hash = self.hasher.hash_one(user_id);
        usize::try_from(hash % len).unwrap_or_default()
    }

    async fn send(&self, user_id: &UserId, command: Command) -> Result<(), Command> {
        let Some(lane) = self.lanes.get(self.lane_index(user_id)) else {
            return Err(command);
        };
        match lane.try_send(command) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(command)) => {
                debug!(user_id = %user_id, "Cart sync lane full, waiting");
                lane.send(command).await.map_err(|e| e.0)
            }
            Err(mpsc::error::TrySendError::Closed(command)) => Err(command),
        }
    }

    /// Queue a full overwrite of `user_id`'s cart.
    ///
    /// Waits only while the identity's lane is full.
    pub async fn save(&self, user_id: &UserId, cart: Cart) -> SaveHandle {
        let (done, rx) = oneshot::channel();
        let command = Command::Save {
            user_id: user_id.clone(),
            cart,
            done,
        };
        if let Err(Command::Save { done, .. }) = self.send(user_id, command).await {
            error!(user_id = %user_id, "Cart sync worker stopped; save dropped");
            let _ = done.send(Err(worker_stopped(StoreOperation::Save)));
        }
        SaveHandle { rx }
    }

    /// Read `user_id`'s cart after every write for that identity queued
    /// before this call.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or a load error if the worker has stopped.
    pub async fn load(&self, user_id: &UserId) -> Result<Cart, StoreError> {
        let (reply, rx) = oneshot::channel();
        let command = Command::Load {
            user_id: user_id.clone(),
            reply,
        };
        if self.send(user_id, command).await.is_err() {
            return Err(worker_stopped(StoreOperation::Load));
        }
        rx.await
            .unwrap_or_else(|_| Err(worker_stopped(StoreOperation::Load)))
    }

    /// Whether every lane is still accepting commands.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lanes.iter().all(|lane| !lane.is_closed())
    }
}

/// Run a store call, failing it once `limit` has passed.
async fn bounded<T>(
    limit: Duration,
    operation: StoreOperation,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(StoreError::new(operation, format!("timed out after {limit:?}"))))
}

async fn run_worker(
    store: Arc<dyn CartStore>,
    mut rx: mpsc::Receiver<Command>,
    call_timeout: Duration,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Save {
                user_id,
                cart,
                done,
            } => {
                let result =
                    bounded(call_timeout, StoreOperation::Save, store.save(&user_id, &cart)).await;
                match &result {
                    Ok(()) => debug!(user_id = %user_id, items = cart.len(), "Cart synced"),
                    Err(e) => error!(user_id = %user_id, error = %e, "Error saving cart"),
                }
                let _ = done.send(result);
            }
            Command::Load { user_id, reply } => {
                let result = bounded(call_timeout, StoreOperation::Load, store.fetch(&user_id))
                    .await
                    .map(|document| match document {
                        Some(document) => {
                            debug!(user_id = %user_id, items = document.cart.len(), "Cart loaded");
                            document.cart
                        }
                        None => {
                            debug!(user_id = %user_id, "No stored cart found, starting fresh");
                            Cart::new()
                        }
                    });
                if let Err(e) = &result {
                    error!(user_id = %user_id, error = %e, "Error loading cart");
                }
                let _ = reply.send(result);
            }
        }
    }
    info!("Cart sync worker stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{CartDocument, MemoryStore};
    use async_trait::async_trait;
    use cartwheel_core::{CartProduct, ProductId};

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn cart_with(quantity: u32) -> Cart {
        let mut cart = Cart::new();
        for _ in 0..quantity {
            cart.add_or_increment(CartProduct {
                id: ProductId::parse("tea").unwrap(),
                name: "Tea".to_string(),
                price: "3.00".parse().unwrap(),
                image: String::new(),
            });
        }
        cart
    }

    /// A store whose calls for `user_stuck` never finish.
    struct StuckStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl CartStore for StuckStore {
        async fn fetch(&self, user_id: &UserId) -> Result<Option<CartDocument>, StoreError> {
            if user_id.as_str() == "user_stuck" {
                std::future::pending::<()>().await;
            }
            self.inner.fetch(user_id).await
        }

        async fn save(&self, user_id: &UserId, cart: &Cart) -> Result<(), StoreError> {
            if user_id.as_str() == "user_stuck" {
                std::future::pending::<()>().await;
            }
            self.inner.save(user_id, cart).await
        }
    }

    fn stuck_store() -> Arc<dyn CartStore> {
        Arc::new(StuckStore {
            inner: MemoryStore::new(),
        })
    }

    #[tokio::test]
    async fn test_load_sees_earlier_detached_saves() {
        let store = MemoryStore::new();
        let sync = CartSync::spawn(Arc::new(store.clone()));

        for quantity in 1..=5 {
            sync.save(&user("user_a"), cart_with(quantity)).await.detach();
        }

        let cart = sync.load(&user("user_a")).await.unwrap();
        let item = cart.get(&ProductId::parse("tea").unwrap()).unwrap();
        assert_eq!(item.quantity(), 5);
        assert_eq!(store.save_count(), 5);
    }

    #[tokio::test]
    async fn test_fresh_identity_loads_empty() {
        let sync = CartSync::spawn(Arc::new(MemoryStore::new()));
        assert!(sync.load(&user("user_new")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_reported_to_handle() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let sync = CartSync::spawn(Arc::new(store));

        let err = sync
            .save(&user("user_a"), cart_with(1))
            .await
            .outcome()
            .await
            .unwrap_err();
        assert_eq!(err.operation(), StoreOperation::Save);
        assert!(sync.is_running());
    }

    #[tokio::test]
    async fn test_worker_survives_failures() {
        let store = MemoryStore::new();
        let sync = CartSync::spawn(Arc::new(store.clone()));

        store.set_unavailable(true);
        assert!(sync.load(&user("user_a")).await.is_err());
        store.set_unavailable(false);

        sync.save(&user("user_a"), cart_with(2))
            .await
            .outcome()
            .await
            .unwrap();
        assert_eq!(sync.load(&user("user_a")).await.unwrap().total_quantity(), 2);
    }

    #[tokio::test]
    async fn test_stuck_shopper_does_not_block_other_lanes() {
        let sync = CartSync::spawn_with(
            stuck_store(),
            SyncOptions {
                lanes: 8,
                queue_capacity: 4,
                call_timeout: Duration::from_secs(3600),
            },
        );
        let stuck = user("user_stuck");
        let other = (0..)
            .map(|n| user(&format!("user_fast{n}")))
            .find(|candidate| sync.lane_index(candidate) != sync.lane_index(&stuck))
            .unwrap();

        let blocked = sync.clone();
        tokio::spawn(async move { blocked.load(&stuck).await });
        tokio::task::yield_now().await;

        sync.save(&other, cart_with(1)).await.detach();
        let loaded = tokio::time::timeout(Duration::from_secs(2), sync.load(&other)).await;
        assert_eq!(loaded.unwrap().unwrap().total_quantity(), 1);
    }

    #[tokio::test]
    async fn test_hung_call_times_out_and_frees_lane() {
        let sync = CartSync::spawn_with(
            stuck_store(),
            SyncOptions {
                lanes: 1,
                queue_capacity: 4,
                call_timeout: Duration::from_millis(50),
            },
        );

        let err = sync.load(&user("user_stuck")).await.unwrap_err();
        assert_eq!(err.operation(), StoreOperation::Load);
        assert!(err.to_string().contains("timed out"));

        let save = sync.save(&user("user_stuck"), cart_with(1)).await;
        assert!(save.outcome().await.is_err());

        // Same lane, so it queued behind both timed-out calls.
        let loaded = tokio::time::timeout(Duration::from_secs(2), sync.load(&user("user_a"))).await;
        assert!(loaded.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_options_still_run_one_lane() {
        let sync = CartSync::spawn_with(
            Arc::new(MemoryStore::new()),
            SyncOptions {
                lanes: 0,
                queue_capacity: 0,
                call_timeout: Duration::from_secs(1),
            },
        );
        assert!(sync.is_running());
        sync.save(&user("user_a"), cart_with(3))
            .await
            .outcome()
            .await
            .unwrap();
        assert_eq!(sync.load(&user("user_a")).await.unwrap().total_quantity(), 3);
    }
}
