//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::{StoreBackend, StorefrontConfig};
use crate::controller::CartController;
use crate::firestore::{FirestoreClient, FirestoreError};
use crate::middleware::IdentityConfig;
use crate::store::{CartStore, MemoryStore, ProductCatalog};
use crate::sync::CartSync;

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("CART_STORE_BACKEND=firestore requires FIRESTORE_PROJECT_ID")]
    MissingFirestoreConfig,
    #[error("Firestore client: {0}")]
    Firestore(#[from] FirestoreError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// catalog, the cart controller, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    catalog: Arc<dyn ProductCatalog>,
    carts: CartController,
}

impl AppState {
    /// Create application state with the configured backend.
    ///
    /// Must be called inside a Tokio runtime; it spawns the cart sync workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the Firestore backend is selected without
    /// Firestore configuration, or its HTTP client can't be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, StateError> {
        match config.backend {
            StoreBackend::Firestore => {
                let firestore = config
                    .firestore
                    .as_ref()
                    .ok_or(StateError::MissingFirestoreConfig)?;
                let client = FirestoreClient::new(firestore, config.catalog_cache_ttl)?;
                tracing::info!(
                    project_id = %firestore.project_id,
                    database = %firestore.database,
                    "Using Firestore cart store"
                );
                Ok(Self::with_stores(
                    config,
                    Arc::new(client.clone()),
                    Arc::new(client),
                ))
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory cart store; carts are lost on restart");
                let store = MemoryStore::new();
                Ok(Self::with_stores(
                    config,
                    Arc::new(store.clone()),
                    Arc::new(store),
                ))
            }
        }
    }

    /// Create application state over explicit stores.
    ///
    /// Must be called inside a Tokio runtime; it spawns the cart sync workers.
    #[must_use]
    pub fn with_stores(
        config: StorefrontConfig,
        carts: Arc<dyn CartStore>,
        catalog: Arc<dyn ProductCatalog>,
    ) -> Self {
        let carts = CartController::new(CartSync::spawn(carts));
        Self {
            inner: Arc::new(AppStateInner {
                config,
                catalog,
                carts,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// The product catalog.
    #[must_use]
    pub fn catalog(&self) -> &dyn ProductCatalog {
        self.inner.catalog.as_ref()
    }

    /// The per-shopper cart controller.
    #[must_use]
    pub fn carts(&self) -> &CartController {
        &self.inner.carts
    }

    /// Identity cookie attributes for this deployment.
    #[must_use]
    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            secure: self.inner.config.secure_cookies(),
        }
    }
}
