//! Integration tests for Cartwheel.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests against the real router and an in-memory store
//! cargo test -p cartwheel-integration-tests
//!
//! # Live tests against a running storefront (CART_STORE_BACKEND=memory is fine)
//! STOREFRONT_BASE_URL=http://localhost:3000 cargo test -p cartwheel-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `storefront_cart` - cart flows through the HTTP surface, in-process
//! - `storefront_live` - smoke tests against a running server

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use cartwheel_core::{Product, ProductId};
use cartwheel_storefront::{
    app, config::StorefrontConfig, middleware::IDENTITY_COOKIE, state::AppState,
    store::MemoryStore,
};
use chrono::{TimeZone, Utc};
use tower::ServiceExt;

/// A response with its body read into a string.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    /// A response header as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The parsed `HX-Trigger` events.
    #[must_use]
    pub fn triggers(&self) -> serde_json::Value {
        self.header("HX-Trigger")
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    /// Message of the `cart-notice` event, if any.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        self.triggers()["cart-notice"]["message"]
            .as_str()
            .map(String::from)
    }

    /// Inner HTML of an out-of-band update for `slot`, if present.
    #[must_use]
    pub fn slot(&self, slot: &str) -> Option<&str> {
        let open = format!("<div id=\"{slot}\" hx-swap-oob=\"innerHTML\">");
        let start = self.body.find(&open)? + open.len();
        let rest = self.body.get(start..)?;
        let end = rest.find("</div>\n<div id=\"").unwrap_or_else(|| {
            let trimmed = rest.trim_end();
            trimmed
                .strip_suffix("</div>")
                .map_or(trimmed.len(), str::len)
        });
        rest.get(..end)
    }
}

/// One browser talking to an in-process storefront.
///
/// Keeps the identity cookie between requests the way a browser would.
pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    identity: Option<String>,
}

impl TestApp {
    /// Storefront over an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Storefront over `store`. A second app over the same store behaves
    /// like a restarted server.
    #[must_use]
    pub fn with_store(store: MemoryStore) -> Self {
        let state = AppState::with_stores(
            StorefrontConfig::default(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );
        Self {
            router: app(state),
            store,
            identity: None,
        }
    }

    /// The identity cookie value this browser holds.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Present `identity` on subsequent requests.
    pub fn set_identity(&mut self, identity: impl Into<String>) {
        self.identity = Some(identity.into());
    }

    /// Forget the identity cookie, as a browser with cookies disabled would.
    pub fn forget_identity(&mut self) {
        self.identity = None;
    }

    async fn send(&mut self, mut request: Request<Body>) -> TestResponse {
        if let Some(identity) = &self.identity {
            let cookie = format!("{IDENTITY_COOKIE}={identity}");
            request.headers_mut().insert(
                header::COOKIE,
                cookie.parse().expect("valid cookie header"),
            );
        }

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        if let Some(set_cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            && let Some(pair) = set_cookie.split(';').next()
            && let Some(value) = pair.strip_prefix(&format!("{IDENTITY_COOKIE}="))
        {
            self.identity = Some(value.to_string());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).expect("utf-8 body"),
        }
    }

    /// `GET path`.
    pub async fn get(&mut self, path: &str) -> TestResponse {
        let request = Request::get(path)
            .body(Body::empty())
            .expect("valid request");
        self.send(request).await
    }

    /// `POST path` with a url-encoded form, as HTMX sends it.
    pub async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = Request::post(path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("HX-Request", "true")
            .body(Body::from(body))
            .expect("valid request");
        self.send(request).await
    }

    /// Click "Add to Cart" on a product card.
    pub async fn add(&mut self, id: &str, name: &str, price: &str, page: &str) -> TestResponse {
        self.post_form(
            "/cart/add",
            &[
                ("id", id),
                ("name", name),
                ("price", price),
                ("image", &format!("/images/{id}.jpg")),
                ("page", page),
            ],
        )
        .await
    }

    /// Click a cart row control.
    pub async fn update(&mut self, action: &str, id: &str) -> TestResponse {
        self.post_form(
            "/cart/update",
            &[("action", action), ("id", id), ("page", "cart")],
        )
        .await
    }

    /// Click checkout on the cart page.
    pub async fn checkout(&mut self) -> TestResponse {
        self.post_form("/checkout", &[("page", "cart")]).await
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// A catalog product created on `day` of January 2026.
#[must_use]
pub fn product(id: &str, name: &str, price: &str, day: u32) -> Product {
    Product {
        id: ProductId::parse(id).expect("valid product id"),
        name: name.to_string(),
        price: price.parse().expect("valid price"),
        image: format!("/images/{id}.jpg"),
        created_at: Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).single(),
    }
}
