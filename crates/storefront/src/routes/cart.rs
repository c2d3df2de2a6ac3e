//! Cart route handlers.
//!
//! Cart actions post from HTMX with `hx-swap="none"` and get back
//! out-of-band fragments for the slots on the page they came from. Saves are
//! queued before the response is sent and complete in the background.

use axum::{
    Form,
    extract::{State, rejection::FormRejection},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use cartwheel_core::{Cart, CartProduct, Price, ProductId, QuantityChange};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::Shopper;
use crate::render::{
    CartCountTemplate, CartPageTemplate, CartView, HostPage, SlotUpdates, render_cart,
    render_counter,
};
use crate::state::AppState;

/// HTMX response header carrying client-side events.
const HX_TRIGGER: &str = "HX-Trigger";

/// Event fired after any cart change.
const CART_UPDATED_EVENT: &str = "cart-updated";

/// Event the page turns into a blocking notice.
const CART_NOTICE_EVENT: &str = "cart-notice";

/// Add to cart form data, as posted by a product card.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub id: String,
    pub name: String,
    pub price: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub page: HostPage,
}

impl AddToCartForm {
    fn into_product(self) -> Result<(CartProduct, HostPage)> {
        let id = ProductId::parse(self.id)
            .map_err(|e| AppError::BadRequest(format!("invalid product id: {e}")))?;
        let price: Price = self
            .price
            .trim()
            .parse()
            .map_err(|e| AppError::BadRequest(format!("invalid price: {e}")))?;
        let product = CartProduct {
            id,
            name: self.name,
            price,
            image: self.image,
        };
        Ok((product, self.page))
    }
}

/// Quantity controls on a cart row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartAction {
    Increase,
    Decrease,
    Delete,
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub action: CartAction,
    pub id: String,
    #[serde(default)]
    pub page: HostPage,
}

/// Checkout form data.
#[derive(Debug, Default, Deserialize)]
pub struct CheckoutForm {
    #[serde(default)]
    pub page: HostPage,
}

fn bad_form(rejection: &FormRejection) -> AppError {
    AppError::BadRequest(rejection.body_text())
}

/// Escape everything outside printable ASCII so the JSON fits in a header.
fn header_safe_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    for c in value.to_string().chars() {
        if c.is_ascii() && !c.is_ascii_control() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

/// `HX-Trigger` value firing `cart-updated`, plus a notice when given.
fn trigger_header(notice: Option<&str>) -> HeaderValue {
    let mut events = json!({ CART_UPDATED_EVENT: {} });
    if let Some(message) = notice {
        events[CART_NOTICE_EVENT] = json!({ "message": message });
    }
    HeaderValue::from_str(&header_safe_json(&events))
        .unwrap_or_else(|_| HeaderValue::from_static(CART_UPDATED_EVENT))
}

fn fragment_response(updates: SlotUpdates, notice: Option<&str>) -> Response {
    let mut response = updates.into_html().into_response();
    response
        .headers_mut()
        .insert(HX_TRIGGER, trigger_header(notice));
    response
}

/// The cart a page load shows.
///
/// A returning shopper's stored cart is re-read so changes from other tabs or
/// devices appear. An identity minted for this request has nothing stored and
/// gets no session.
pub(crate) async fn page_cart(state: &AppState, shopper: &Shopper) -> Cart {
    if shopper.is_new() {
        return Cart::new();
    }
    state.carts().open(&shopper.0).await
}

/// Display cart page.
#[instrument(skip(state, shopper), fields(user_id = %shopper.0))]
pub async fn show(State(state): State<AppState>, shopper: Shopper) -> impl IntoResponse {
    let cart = page_cart(&state, &shopper).await;
    let cart = CartView::from(&cart);

    CartPageTemplate {
        page: HostPage::Cart,
        cart_count: cart.count,
        cart,
    }
}

/// Get cart count badge (HTMX).
#[instrument(skip(state, shopper), fields(user_id = %shopper.0))]
pub async fn count(State(state): State<AppState>, shopper: Shopper) -> impl IntoResponse {
    let count = if shopper.is_new() {
        0
    } else {
        state.carts().current(&shopper.0).await.total_quantity()
    };
    CartCountTemplate { count }
}

/// Add item to cart (HTMX).
///
/// Only the counter is re-rendered. The `HX-Trigger` header carries a
/// `cart-notice` acknowledging the add.
#[instrument(skip(state, shopper, form), fields(user_id = %shopper.0))]
pub async fn add(
    State(state): State<AppState>,
    shopper: Shopper,
    form: std::result::Result<Form<AddToCartForm>, FormRejection>,
) -> Result<Response> {
    let Form(form) = form.map_err(|e| bad_form(&e))?;
    let (product, page) = form.into_product()?;
    let name = product.name.clone();
    let product_id = product.id.to_string();

    let (quantity, cart) = state
        .carts()
        .add_or_increment(&shopper.0, product)
        .await
        .detach();
    debug!(product_id = %product_id, quantity, "Added to cart");
    add_breadcrumb("cart", "Added to cart", &[("product_id", &product_id)]);

    let mut updates = SlotUpdates::new(page);
    render_counter(&mut updates, &cart)?;

    let notice = format!("{name} added to cart!");
    Ok(fragment_response(updates, Some(&notice)))
}

/// Increase, decrease, or delete a cart row (HTMX).
#[instrument(skip(state, shopper, form), fields(user_id = %shopper.0))]
pub async fn update(
    State(state): State<AppState>,
    shopper: Shopper,
    form: std::result::Result<Form<UpdateCartForm>, FormRejection>,
) -> Result<Response> {
    let Form(form) = form.map_err(|e| bad_form(&e))?;
    let product_id = ProductId::parse(form.id)
        .map_err(|e| AppError::BadRequest(format!("invalid product id: {e}")))?;

    let carts = state.carts();
    let cart = match form.action {
        CartAction::Increase | CartAction::Decrease => {
            let delta = if form.action == CartAction::Increase { 1 } else { -1 };
            let (change, cart) = carts
                .change_quantity(&shopper.0, &product_id, delta)
                .await
                .detach();
            if change == QuantityChange::Missing {
                debug!(product_id = %product_id, "Quantity change for item not in cart");
            }
            cart
        }
        CartAction::Delete => {
            let (_, cart) = carts.delete_item(&shopper.0, &product_id).await.detach();
            cart
        }
    };

    let mut updates = SlotUpdates::new(form.page);
    render_counter(&mut updates, &cart)?;
    render_cart(&mut updates, &cart)?;
    Ok(fragment_response(updates, None))
}

/// Checkout (HTMX).
///
/// A non-empty cart is acknowledged with its total, then cleared. An empty
/// cart gets `204 No Content` and nothing changes.
#[instrument(skip(state, shopper, form), fields(user_id = %shopper.0))]
pub async fn checkout(
    State(state): State<AppState>,
    shopper: Shopper,
    form: std::result::Result<Form<CheckoutForm>, FormRejection>,
) -> Result<Response> {
    let Form(form) = form.map_err(|e| bad_form(&e))?;

    let (checkout, cart) = state.carts().checkout(&shopper.0).await.detach();
    let Some(checkout) = checkout else {
        debug!("Checkout on empty cart ignored");
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let total = checkout.total.display();
    tracing::info!(total = %total, quantity = checkout.quantity, "Checkout");
    add_breadcrumb("cart", "Checkout", &[("total", &total)]);

    let mut updates = SlotUpdates::new(form.page);
    render_counter(&mut updates, &cart)?;
    render_cart(&mut updates, &cart)?;

    let notice = format!("Proceeding to checkout for {total}.");
    Ok(fragment_response(updates, Some(&notice)))
}
