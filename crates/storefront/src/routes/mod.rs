//! Storefront HTTP surface.
//!
//! Mutating routes answer with out-of-band fragments for the slots present
//! on the posting page plus an `HX-Trigger` header.
//!
//! ```text
//! GET  /                       - Redirect to /products
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (every cart sync lane alive)
//!
//! GET  /products               - Catalog grid, newest first
//! GET  /products/grid          - Grid refresh (products-grid fragment)
//! GET  /cart                   - Cart page
//! POST /cart/add               - Add to cart (counter fragment, cart-notice trigger)
//! POST /cart/update            - Increase / decrease / delete (cart fragments)
//! GET  /cart/count             - Bare item count
//! POST /checkout               - Clear a non-empty cart (cart fragments, cart-notice trigger)
//! ```

pub mod cart;
pub mod products;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
};

use crate::error::AppError;
use crate::state::AppState;

/// Routes nested under `/cart`.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/count", get(cart::count))
}

/// Every storefront route, before state and middleware are attached.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/products") }))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/products", get(products::index))
        .route("/products/grid", get(products::grid))
        .nest("/cart", cart_routes())
        .route("/checkout", post(cart::checkout))
        .fallback(not_found)
}

/// Liveness: the process answers.
async fn health() -> &'static str {
    "ok"
}

/// Readiness: 503 once any cart sync lane has stopped.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.carts().sync().is_running() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn not_found() -> AppError {
    AppError::NotFound("page".to_string())
}
