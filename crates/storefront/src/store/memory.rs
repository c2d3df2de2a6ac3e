//! In-process cart store and catalog.
//!
//! Backs `CART_STORE_BACKEND=memory` and the test suites. Behaves like the
//! Firestore collections (full overwrites, server-stamped `lastUpdated`,
//! newest-first catalog) and can be told to fail to exercise error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use cartwheel_core::{Cart, Product, UserId};
use chrono::Utc;

use super::{CartDocument, CartStore, ProductCatalog, StoreError, StoreOperation};

#[derive(Default)]
struct Inner {
    carts: RwLock<HashMap<UserId, CartDocument>>,
    products: RwLock<Vec<Product>>,
    unavailable: AtomicBool,
    saves: AtomicUsize,
    fetches: AtomicUsize,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose catalog already holds `products`.
    #[must_use]
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.inner.products.write() {
            guard.extend(products);
        }
        store
    }

    /// Make every operation fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful cart saves so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.inner.saves.load(Ordering::SeqCst)
    }

    /// Number of cart document reads attempted so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    fn check_available(&self, operation: StoreOperation) -> Result<(), StoreError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::new(operation, "memory store marked unavailable"));
        }
        Ok(())
    }
}

fn poisoned(operation: StoreOperation) -> StoreError {
    StoreError::new(operation, "memory store lock poisoned")
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn fetch(&self, user_id: &UserId) -> Result<Option<CartDocument>, StoreError> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available(StoreOperation::Load)?;
        let carts = self
            .inner
            .carts
            .read()
            .map_err(|_| poisoned(StoreOperation::Load))?;
        Ok(carts.get(user_id).cloned())
    }

    async fn save(&self, user_id: &UserId, cart: &Cart) -> Result<(), StoreError> {
        self.check_available(StoreOperation::Save)?;
        let document = CartDocument {
            cart: cart.clone(),
            last_updated: Some(Utc::now()),
        };
        self.inner
            .carts
            .write()
            .map_err(|_| poisoned(StoreOperation::Save))?
            .insert(user_id.clone(), document);
        self.inner.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        self.check_available(StoreOperation::ListProducts)?;
        let mut products: Vec<Product> = self
            .inner
            .products
            .read()
            .map_err(|_| poisoned(StoreOperation::ListProducts))?
            .iter()
            .filter(|product| product.created_at.is_some())
            .cloned()
            .collect();
        // Ordering by a field drops documents without it, as Firestore does.
        // Stable sort keeps insertion order for equal timestamps.
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn put_product(&self, product: &Product) -> Result<(), StoreError> {
        self.check_available(StoreOperation::PutProduct)?;
        let mut products = self
            .inner
            .products
            .write()
            .map_err(|_| poisoned(StoreOperation::PutProduct))?;
        match products.iter_mut().find(|existing| existing.id == product.id) {
            Some(existing) => *existing = product.clone(),
            None => products.push(product.clone()),
        }
        Ok(())
    }
}
