//! Product route handlers.

use axum::{extract::State, response::IntoResponse};
use cartwheel_core::Product;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::Shopper;
use crate::render::{HostPage, ProductCardView, ProductsPageTemplate, SlotUpdates, render_products};
use crate::routes::cart::page_cart;
use crate::state::AppState;

async fn listing(state: &AppState) -> Vec<Product> {
    state.catalog().list_products().await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Error fetching products");
        Vec::new()
    })
}

/// Product listing page, newest first.
///
/// A catalog failure is logged and renders an empty grid.
#[instrument(skip(state, shopper), fields(user_id = %shopper.0))]
pub async fn index(State(state): State<AppState>, shopper: Shopper) -> impl IntoResponse {
    let (cart, products) = tokio::join!(page_cart(&state, &shopper), listing(&state));

    ProductsPageTemplate {
        page: HostPage::Products,
        cart_count: cart.total_quantity(),
        products: products.iter().map(ProductCardView::from).collect(),
        refresh_secs: state.config().catalog_cache_ttl.as_secs(),
    }
}

/// Fresh product cards as an out-of-band swap into the products grid.
///
/// The products page polls this once per catalog cache lifetime.
#[instrument(skip(state))]
pub async fn grid(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let products = listing(&state).await;
    let mut updates = SlotUpdates::new(HostPage::Products);
    render_products(&mut updates, &products)?;
    Ok(updates.into_html())
}
