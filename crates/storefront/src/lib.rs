//! Cartwheel storefront library.
//!
//! Anonymous-shopper cart: a cookie identity, per-shopper carts persisted to
//! Firestore (or memory), and HTMX-driven pages rendered with Askama. The
//! binary in `main.rs` wires [`app`] to a listener; the integration tests
//! drive the same router in-process.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod controller;
pub mod error;
pub mod filters;
pub mod firestore;
pub mod middleware;
pub mod render;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;

use axum::{Router, body::Body, http::Request};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::Span;

use state::AppState;

/// Static assets, relative to the workspace root.
pub const STATIC_DIR: &str = "crates/storefront/static";

/// Request span with slots for the fields middleware fills in later.
fn make_request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = tracing::field::Empty,
        user_id = tracing::field::Empty,
    )
}

/// Build the storefront router with its middleware stack.
pub fn app(state: AppState) -> Router {
    let identity = state.identity_config();

    Router::new()
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(axum::middleware::from_fn_with_state(
            identity,
            middleware::identity_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
