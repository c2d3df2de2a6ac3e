//! Firestore REST API client.
//!
//! # Architecture
//!
//! - Plain `reqwest` calls against the v1 REST surface; no SDK
//! - Carts live in `carts/{user_id}` and are written with a single
//!   `documents:commit` (full overwrite plus a `REQUEST_TIME` transform on
//!   `lastUpdated`)
//! - The catalog is read with `documents:runQuery` ordered by `createdAt`
//!   descending and cached in memory via `moka`
//!
//! # Example
//!
//! ```rust,ignore
//! use cartwheel_storefront::firestore::FirestoreClient;
//! use cartwheel_storefront::store::CartStore;
//!
//! let client = FirestoreClient::new(&config, Duration::from_secs(300))?;
//! let cart = client.load(&user_id).await?;
//! client.save(&user_id, &cart).await?;
//! ```

pub mod conversions;
pub mod value;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cartwheel_core::{Cart, Product, UserId};
use moka::future::Cache;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::FirestoreConfig;
use crate::store::{CartDocument, CartStore, ProductCatalog, StoreError, StoreOperation};

use conversions::{
    CREATED_AT_FIELD, DecodeError, LAST_UPDATED_FIELD, decode_cart, decode_product, encode_cart,
    encode_product,
};
use value::{
    CollectionSelector, CommitRequest, Direction, Document, ErrorEnvelope, FieldReference,
    FieldTransform, Order, RunQueryRequest, RunQueryResponse, ServerValue, StructuredQuery, Write,
};

/// Collection holding one cart document per identity.
pub const CARTS_COLLECTION: &str = "carts";
/// Collection holding the product catalog.
pub const PRODUCTS_COLLECTION: &str = "products";

const CATALOG_CACHE_KEY: &str = "products";

/// Upper bound on a single REST call, connect included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur when talking to Firestore.
#[derive(Debug, Error)]
pub enum FirestoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Firestore answered with a non-success status.
    #[error("Firestore returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A stored document doesn't have the expected shape.
    #[error("invalid document {document}: {source}")]
    Decode {
        document: String,
        source: DecodeError,
    },

    /// The configured endpoint can't be extended with a document path.
    #[error("endpoint {0} cannot carry a document path")]
    Endpoint(String),
}

// =============================================================================
// FirestoreClient
// =============================================================================

/// Client for the Firestore REST API.
///
/// Cheap to clone; clones share the HTTP connection pool and catalog cache.
#[derive(Clone)]
pub struct FirestoreClient {
    inner: Arc<FirestoreClientInner>,
}

struct FirestoreClientInner {
    client: reqwest::Client,
    endpoint: Url,
    /// `projects/{project}/databases/{database}`
    database_path: String,
    api_key: Option<SecretString>,
    catalog: Cache<&'static str, Arc<Vec<Product>>>,
}

impl FirestoreClient {
    /// Create a new client. Product listings are cached for `catalog_ttl`.
    ///
    /// # Errors
    ///
    /// Returns `FirestoreError::Http` if the HTTP client can't be built.
    pub fn new(config: &FirestoreConfig, catalog_ttl: Duration) -> Result<Self, FirestoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let catalog = Cache::builder()
            .max_capacity(1)
            .time_to_live(catalog_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(FirestoreClientInner {
                client,
                endpoint: config.endpoint.clone(),
                database_path: format!(
                    "projects/{}/databases/{}",
                    config.project_id, config.database
                ),
                api_key: config.api_key.clone(),
                catalog,
            }),
        })
    }

    /// Full resource name of a document.
    fn document_name(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/documents/{collection}/{id}",
            self.inner.database_path
        )
    }

    /// Build a request URL below the endpoint from raw path segments.
    ///
    /// Each segment is percent-encoded on its own, so ids can't escape their
    /// collection.
    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, FirestoreError> {
        let mut url = self.inner.endpoint.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| FirestoreError::Endpoint(self.inner.endpoint.to_string()))?;
            path.pop_if_empty();
            path.extend(self.inner.database_path.split('/'));
            path.extend(segments);
        }
        if let Some(key) = &self.inner.api_key {
            url.query_pairs_mut()
                .append_pair("key", key.expose_secret());
        }
        Ok(url)
    }

    fn document_url(&self, collection: &str, id: &str) -> Result<Url, FirestoreError> {
        self.url(["documents", collection, id])
    }

    /// URL of a database-level method such as `documents:commit`.
    fn method_url(&self, method: &str) -> Result<Url, FirestoreError> {
        self.url([format!("documents:{method}").as_str()])
    }

    /// Read a JSON body, turning non-success statuses into errors.
    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, FirestoreError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body).map_or_else(
                |_| body.chars().take(200).collect(),
                |envelope| format!("{} ({})", envelope.error.message, envelope.error.status),
            );
            tracing::warn!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Firestore returned non-success status"
            );
            return Err(FirestoreError::Status { status, message });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse Firestore response"
            );
            FirestoreError::Parse(e)
        })
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, FirestoreError> {
        let response = self
            .inner
            .client
            .post(self.method_url(method)?)
            .json(body)
            .send()
            .await?;
        Self::read_json(response).await
    }

    /// Get a document, or `None` if it doesn't exist.
    #[instrument(skip(self))]
    pub async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, FirestoreError> {
        let response = self
            .inner
            .client
            .get(self.document_url(collection, id)?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Document not found");
            return Ok(None);
        }
        Self::read_json(response).await.map(Some)
    }

    /// Apply writes atomically.
    #[instrument(skip_all, fields(writes = writes.len()))]
    pub async fn commit(&self, writes: Vec<Write>) -> Result<(), FirestoreError> {
        let _: serde_json::Value = self.post("commit", &CommitRequest { writes }).await?;
        Ok(())
    }

    /// Run a structured query and return the matching documents.
    #[instrument(skip_all)]
    pub async fn run_query(&self, query: StructuredQuery) -> Result<Vec<Document>, FirestoreError> {
        let rows: Vec<RunQueryResponse> = self
            .post(
                "runQuery",
                &RunQueryRequest {
                    structured_query: query,
                },
            )
            .await?;
        Ok(rows.into_iter().filter_map(|row| row.document).collect())
    }

    // =========================================================================
    // Carts
    // =========================================================================

    /// Fetch the cart document for an identity.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_cart(&self, user_id: &UserId) -> Result<Option<CartDocument>, FirestoreError> {
        let Some(document) = self
            .get_document(CARTS_COLLECTION, user_id.as_str())
            .await?
        else {
            return Ok(None);
        };

        decode_cart(&document.fields)
            .map(Some)
            .map_err(|source| FirestoreError::Decode {
                document: document.name.clone(),
                source,
            })
    }

    /// Overwrite the cart document for an identity.
    #[instrument(skip(self, cart), fields(user_id = %user_id, items = cart.len()))]
    pub async fn set_cart(&self, user_id: &UserId, cart: &Cart) -> Result<(), FirestoreError> {
        let write = Write {
            update: Document {
                name: self.document_name(CARTS_COLLECTION, user_id.as_str()),
                fields: encode_cart(cart),
                ..Document::default()
            },
            update_transforms: vec![FieldTransform {
                field_path: LAST_UPDATED_FIELD.to_string(),
                set_to_server_value: ServerValue::RequestTime,
            }],
        };
        self.commit(vec![write]).await
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// List products newest first, serving from cache when fresh.
    ///
    /// Documents that fail to decode are logged and left out of the listing.
    #[instrument(skip(self))]
    pub async fn get_products(&self) -> Result<Arc<Vec<Product>>, FirestoreError> {
        if let Some(cached) = self.inner.catalog.get(CATALOG_CACHE_KEY).await {
            debug!("Catalog cache hit");
            return Ok(cached);
        }

        let query = StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: PRODUCTS_COLLECTION.to_string(),
            }],
            order_by: vec![Order {
                field: FieldReference {
                    field_path: CREATED_AT_FIELD.to_string(),
                },
                direction: Direction::Descending,
            }],
        };

        let products: Vec<Product> = self
            .run_query(query)
            .await?
            .into_iter()
            .filter_map(|document| match decode_product(document.id(), &document.fields) {
                Ok(product) => Some(product),
                Err(e) => {
                    tracing::warn!(document = %document.name, error = %e, "Skipping malformed product");
                    None
                }
            })
            .collect();

        let products = Arc::new(products);
        self.inner
            .catalog
            .insert(CATALOG_CACHE_KEY, Arc::clone(&products))
            .await;
        Ok(products)
    }

    /// Create or overwrite a product document and drop the cached listing.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn set_product(&self, product: &Product) -> Result<(), FirestoreError> {
        let mut update_transforms = Vec::new();
        if product.created_at.is_none() {
            update_transforms.push(FieldTransform {
                field_path: CREATED_AT_FIELD.to_string(),
                set_to_server_value: ServerValue::RequestTime,
            });
        }

        let write = Write {
            update: Document {
                name: self.document_name(PRODUCTS_COLLECTION, product.id.as_str()),
                fields: encode_product(product),
                ..Document::default()
            },
            update_transforms,
        };
        self.commit(vec![write]).await?;
        self.inner.catalog.invalidate(CATALOG_CACHE_KEY).await;
        Ok(())
    }
}

#[async_trait]
impl CartStore for FirestoreClient {
    async fn fetch(&self, user_id: &UserId) -> Result<Option<CartDocument>, StoreError> {
        self.get_cart(user_id)
            .await
            .map_err(|e| StoreError::new(StoreOperation::Load, e))
    }

    async fn save(&self, user_id: &UserId, cart: &Cart) -> Result<(), StoreError> {
        self.set_cart(user_id, cart)
            .await
            .map_err(|e| StoreError::new(StoreOperation::Save, e))
    }
}

#[async_trait]
impl ProductCatalog for FirestoreClient {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        self.get_products()
            .await
            .map(|products| products.as_ref().clone())
            .map_err(|e| StoreError::new(StoreOperation::ListProducts, e))
    }

    async fn put_product(&self, product: &Product) -> Result<(), StoreError> {
        self.set_product(product)
            .await
            .map_err(|e| StoreError::new(StoreOperation::PutProduct, e))
    }
}
