//! Cart and catalog persistence.
//!
//! # Architecture
//!
//! - [`CartStore`] reads and overwrites the one document each shopper's cart
//!   lives in, keyed by their anonymous identity
//! - [`ProductCatalog`] lists the read-only product collection, newest first
//! - Both are implemented by [`FirestoreClient`](crate::firestore::FirestoreClient)
//!   for production and by [`MemoryStore`] for local development and tests
//!
//! Every remote failure is reported as a [`StoreError`]. Callers log it and
//! carry on; nothing here retries.

mod memory;

pub use memory::MemoryStore;

use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use cartwheel_core::{Cart, Product, UserId};
use chrono::{DateTime, Utc};

/// Boxed error source carried by `StoreError`.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The remote operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    Load,
    Save,
    ListProducts,
    PutProduct,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "cart load",
            Self::Save => "cart save",
            Self::ListProducts => "product listing",
            Self::PutProduct => "product write",
        })
    }
}

/// A remote read or write failed.
///
/// This is the only failure the cart distinguishes: there is no split between
/// transient and permanent errors.
#[derive(Debug, thiserror::Error)]
#[error("remote {operation} failed: {source}")]
pub struct StoreError {
    operation: StoreOperation,
    source: BoxError,
}

impl StoreError {
    pub fn new(operation: StoreOperation, source: impl Into<BoxError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }

    #[must_use]
    pub const fn operation(&self) -> StoreOperation {
        self.operation
    }
}

/// A stored cart with its server-assigned write time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartDocument {
    pub cart: Cart,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Remote persistence of carts, one document per identity.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Fetch the stored document, or `None` if this identity never saved.
    async fn fetch(&self, user_id: &UserId) -> Result<Option<CartDocument>, StoreError>;

    /// Overwrite the identity's document with the full item list and a
    /// server timestamp.
    async fn save(&self, user_id: &UserId, cart: &Cart) -> Result<(), StoreError>;

    /// Load the identity's cart; an identity without a document has an empty
    /// cart.
    async fn load(&self, user_id: &UserId) -> Result<Cart, StoreError> {
        Ok(self
            .fetch(user_id)
            .await?
            .map(|document| document.cart)
            .unwrap_or_default())
    }
}

/// The read-only product listing.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// All products, ordered by creation time, newest first.
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Create or overwrite a product (operator tooling only).
    async fn put_product(&self, product: &Product) -> Result<(), StoreError>;
}
