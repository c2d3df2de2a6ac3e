//! Per-shopper cart ownership.
//!
//! The controller holds each identity's cart in memory and is the only thing
//! that mutates it. Every mutation runs under that identity's lock, queues a
//! full-cart save while still holding it, and hands back a snapshot for
//! rendering. Page loads re-read the stored document so changes made from
//! another tab or device show up.
//!
//! Idle sessions are kept in a bounded `moka` cache. A session evicted while a
//! request still holds it stays reachable through a registry of weak
//! references, so an identity never has two live locks.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;

use cartwheel_core::{Cart, CartProduct, Price, ProductId, QuantityChange, UserId};
use moka::future::Cache;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument};

use crate::sync::{CartSync, SaveHandle};

/// Idle carts are dropped from memory after this long; the next request
/// reloads them from the store.
const SESSION_IDLE: Duration = Duration::from_secs(30 * 60);
const MAX_SESSIONS: u64 = 10_000;

/// Dead registry entries are swept once the registry grows past this.
const LIVE_PRUNE_THRESHOLD: usize = 20_000;

#[derive(Default)]
struct Session {
    cart: Cart,
    /// Whether the stored document has been read into `cart` yet.
    loaded: bool,
}

/// Result of a cart mutation.
pub struct Mutation<T> {
    /// What the mutation did.
    pub outcome: T,
    /// The cart after the mutation.
    pub cart: Cart,
    /// The queued save, or `None` when nothing changed and nothing was saved.
    pub save: Option<SaveHandle>,
}

impl<T> Mutation<T> {
    /// Let the save finish in the background.
    pub fn detach(self) -> (T, Cart) {
        if let Some(save) = self.save {
            save.detach();
        }
        (self.outcome, self.cart)
    }
}

/// What checkout cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkout {
    /// Grand total at the moment of checkout.
    pub total: Price,
    /// Number of units checked out.
    pub quantity: u64,
}

type SharedSession = Arc<Mutex<Session>>;

/// Owner of every shopper's in-memory cart.
#[derive(Clone)]
pub struct CartController {
    /// Recently used sessions, kept alive while idle.
    sessions: Cache<UserId, SharedSession>,
    /// Every session something still holds, cached or not.
    live: Arc<std::sync::Mutex<HashMap<UserId, Weak<Mutex<Session>>>>>,
    sync: CartSync,
}

impl CartController {
    #[must_use]
    pub fn new(sync: CartSync) -> Self {
        let sessions = Cache::builder()
            .max_capacity(MAX_SESSIONS)
            .time_to_idle(SESSION_IDLE)
            .build();
        Self {
            sessions,
            live: Arc::default(),
            sync,
        }
    }

    /// The persistence worker this controller writes through.
    #[must_use]
    pub const fn sync(&self) -> &CartSync {
        &self.sync
    }

    /// The one session for `user_id`, created on first use.
    async fn session(&self, user_id: &UserId) -> SharedSession {
        if let Some(session) = self.sessions.get(user_id).await {
            return session;
        }
        let session = {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            match live.get(user_id).and_then(Weak::upgrade) {
                Some(session) => session,
                None => {
                    if live.len() >= LIVE_PRUNE_THRESHOLD {
                        live.retain(|_, session| session.strong_count() > 0);
                    }
                    let session = SharedSession::default();
                    live.insert(user_id.clone(), Arc::downgrade(&session));
                    session
                }
            }
        };
        self.sessions
            .insert(user_id.clone(), Arc::clone(&session))
            .await;
        session
    }

    /// Lock an identity's session, loading the stored cart on first use.
    ///
    /// A failed first load leaves the cart empty; it is not retried until the
    /// next page load.
    async fn lock(&self, user_id: &UserId) -> OwnedMutexGuard<Session> {
        let session = self.session(user_id).await;
        let mut guard = session.lock_owned().await;
        if !guard.loaded {
            if let Ok(cart) = self.sync.load(user_id).await {
                guard.cart = cart;
            }
            guard.loaded = true;
        }
        guard
    }

    /// Page load: re-read the stored cart and make it current.
    ///
    /// On a failed read the in-memory cart is kept as it was.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn open(&self, user_id: &UserId) -> Cart {
        let session = self.session(user_id).await;
        let mut guard = session.lock().await;
        match self.sync.load(user_id).await {
            Ok(cart) => guard.cart = cart,
            Err(_) => debug!("Keeping in-memory cart after failed load"),
        }
        guard.loaded = true;
        guard.cart.clone()
    }

    /// The current cart without re-reading the store.
    pub async fn current(&self, user_id: &UserId) -> Cart {
        self.lock(user_id).await.cart.clone()
    }

    /// Apply `f` under the identity's lock and queue a save if `changed`
    /// says the outcome warrants one.
    async fn mutate<T>(
        &self,
        user_id: &UserId,
        f: impl FnOnce(&mut Cart) -> T,
        changed: impl FnOnce(&T) -> bool,
    ) -> Mutation<T> {
        let mut guard = self.lock(user_id).await;
        let outcome = f(&mut guard.cart);
        let cart = guard.cart.clone();
        let save = if changed(&outcome) {
            Some(self.sync.save(user_id, cart.clone()).await)
        } else {
            None
        };
        drop(guard);
        Mutation {
            outcome,
            cart,
            save,
        }
    }

    /// Add one unit of a product. Always persists.
    #[instrument(skip(self, product), fields(user_id = %user_id, product_id = %product.id))]
    pub async fn add_or_increment(&self, user_id: &UserId, product: CartProduct) -> Mutation<u32> {
        self.mutate(user_id, |cart| cart.add_or_increment(product), |_| true)
            .await
    }

    /// Adjust a quantity; reaching zero removes the item.
    ///
    /// An unknown product id changes nothing and saves nothing.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn change_quantity(
        &self,
        user_id: &UserId,
        product_id: &ProductId,
        delta: i64,
    ) -> Mutation<QuantityChange> {
        self.mutate(
            user_id,
            |cart| cart.change_quantity(product_id, delta),
            |outcome| *outcome != QuantityChange::Missing,
        )
        .await
    }

    /// Remove a product. Persists even when it wasn't in the cart.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn delete_item(&self, user_id: &UserId, product_id: &ProductId) -> Mutation<bool> {
        self.mutate(user_id, |cart| cart.delete_item(product_id), |_| true)
            .await
    }

    /// Empty the cart. Persists unconditionally.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn clear(&self, user_id: &UserId) -> Mutation<()> {
        self.mutate(user_id, Cart::clear, |_| true).await
    }

    /// Checkout: clear a non-empty cart and report what it held.
    ///
    /// An empty cart is left alone and `outcome` is `None`.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn checkout(&self, user_id: &UserId) -> Mutation<Option<Checkout>> {
        self.mutate(
            user_id,
            |cart| {
                if cart.is_empty() {
                    return None;
                }
                let checkout = Checkout {
                    total: cart.total(),
                    quantity: cart.total_quantity(),
                };
                cart.clear();
                Some(checkout)
            },
            Option::is_some,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{CartStore, MemoryStore};

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn pid(id: &str) -> ProductId {
        ProductId::parse(id).unwrap()
    }

    fn product(id: &str, price: &str) -> CartProduct {
        CartProduct {
            id: pid(id),
            name: id.to_uppercase(),
            price: price.parse().unwrap(),
            image: format!("{id}.jpg"),
        }
    }

    fn controller(store: &MemoryStore) -> CartController {
        CartController::new(CartSync::spawn(Arc::new(store.clone())))
    }

    #[tokio::test]
    async fn test_add_twice_then_persisted() {
        let store = MemoryStore::new();
        let carts = controller(&store);
        let shopper = user("user_a");

        carts.add_or_increment(&shopper, product("a", "9.99")).await.detach();
        let mutation = carts.add_or_increment(&shopper, product("a", "9.99")).await;
        assert_eq!(mutation.outcome, 2);
        mutation.save.unwrap().outcome().await.unwrap();

        let stored = store.load(&shopper).await.unwrap();
        assert_eq!(stored.total_quantity(), 2);
        assert_eq!(stored.get(&pid("a")).unwrap().subtotal().display(), "$19.98");
    }

    #[tokio::test]
    async fn test_first_access_loads_stored_cart() {
        let store = MemoryStore::new();
        let mut stored = Cart::new();
        stored.add_or_increment(product("a", "1.00"));
        store.save(&user("user_a"), &stored).await.unwrap();

        let carts = controller(&store);
        let mutation = carts.add_or_increment(&user("user_a"), product("b", "1.00")).await;
        assert_eq!(mutation.cart.len(), 2);
    }

    #[tokio::test]
    async fn test_change_quantity_missing_skips_save() {
        let store = MemoryStore::new();
        let carts = controller(&store);

        let mutation = carts.change_quantity(&user("user_a"), &pid("nope"), 1).await;
        assert_eq!(mutation.outcome, QuantityChange::Missing);
        assert!(mutation.save.is_none());
    }

    #[tokio::test]
    async fn test_decrease_to_zero_removes_and_saves() {
        let store = MemoryStore::new();
        let carts = controller(&store);
        let shopper = user("user_a");
        carts.add_or_increment(&shopper, product("a", "1.00")).await.detach();

        let mutation = carts.change_quantity(&shopper, &pid("a"), -1).await;
        assert_eq!(mutation.outcome, QuantityChange::Removed);
        mutation.save.unwrap().outcome().await.unwrap();
        assert!(store.load(&shopper).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_still_persists() {
        let store = MemoryStore::new();
        let carts = controller(&store);

        let mutation = carts.delete_item(&user("user_a"), &pid("ghost")).await;
        assert!(!mutation.outcome);
        mutation.save.unwrap().outcome().await.unwrap();
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_checkout_clears_and_persists_empty() {
        let store = MemoryStore::new();
        let carts = controller(&store);
        let shopper = user("user_a");
        carts.add_or_increment(&shopper, product("a", "10.00")).await.detach();
        carts.add_or_increment(&shopper, product("a", "10.00")).await.detach();
        carts.add_or_increment(&shopper, product("b", "5.50")).await.detach();

        let mutation = carts.checkout(&shopper).await;
        let checkout = mutation.outcome.unwrap();
        assert_eq!(checkout.total.display(), "$25.50");
        assert_eq!(checkout.quantity, 3);
        assert!(mutation.cart.is_empty());
        mutation.save.unwrap().outcome().await.unwrap();

        let document = store.fetch(&shopper).await.unwrap().unwrap();
        assert!(document.cart.is_empty());
    }

    #[tokio::test]
    async fn test_checkout_empty_is_noop() {
        let store = MemoryStore::new();
        let carts = controller(&store);

        let mutation = carts.checkout(&user("user_a")).await;
        assert!(mutation.outcome.is_none());
        assert!(mutation.save.is_none());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_open_picks_up_external_writes() {
        let store = MemoryStore::new();
        let carts = controller(&store);
        let shopper = user("user_a");
        carts.add_or_increment(&shopper, product("a", "1.00")).await.detach();

        // Another device overwrites the document.
        let mut elsewhere = Cart::new();
        elsewhere.add_or_increment(product("z", "2.00"));
        carts.sync().load(&shopper).await.unwrap();
        store.save(&shopper, &elsewhere).await.unwrap();

        let cart = carts.open(&shopper).await;
        assert!(cart.get(&pid("z")).is_some());
        assert!(cart.get(&pid("a")).is_none());
    }

    #[tokio::test]
    async fn test_open_keeps_cart_when_load_fails() {
        let store = MemoryStore::new();
        let carts = controller(&store);
        let shopper = user("user_a");
        carts.add_or_increment(&shopper, product("a", "1.00")).await.detach();
        carts.sync().load(&shopper).await.unwrap();

        store.set_unavailable(true);
        let cart = carts.open(&shopper).await;
        assert_eq!(cart.total_quantity(), 1);
    }

    #[tokio::test]
    async fn test_evicted_session_in_use_is_not_duplicated() {
        let store = MemoryStore::new();
        let carts = controller(&store);
        let shopper = user("user_a");
        carts.add_or_increment(&shopper, product("a", "1.00")).await.detach();

        let mut held = carts.lock(&shopper).await;
        carts.sessions.invalidate(&shopper).await;

        let racing = {
            let carts = carts.clone();
            let shopper = shopper.clone();
            tokio::spawn(async move {
                let (_, cart) = carts
                    .add_or_increment(&shopper, product("b", "1.00"))
                    .await
                    .detach();
                cart
            })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!racing.is_finished());

        held.cart.add_or_increment(product("c", "1.00"));
        drop(held);

        let cart = racing.await.unwrap();
        for id in ["a", "b", "c"] {
            assert!(cart.get(&pid(id)).is_some(), "missing {id}");
        }
    }

    #[tokio::test]
    async fn test_idle_evicted_session_reloads_from_store() {
        let store = MemoryStore::new();
        let carts = controller(&store);
        let shopper = user("user_a");
        let mutation = carts.add_or_increment(&shopper, product("a", "1.00")).await;
        mutation.save.unwrap().outcome().await.unwrap();

        carts.sessions.invalidate(&shopper).await;
        assert_eq!(carts.current(&shopper).await.total_quantity(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_optimistic_cart() {
        let store = MemoryStore::new();
        let carts = controller(&store);
        let shopper = user("user_a");
        store.set_unavailable(true);

        let mutation = carts.add_or_increment(&shopper, product("a", "1.00")).await;
        assert!(mutation.save.unwrap().outcome().await.is_err());
        assert_eq!(carts.current(&shopper).await.total_quantity(), 1);
    }
}
