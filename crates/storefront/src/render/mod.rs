//! HTML rendering of carts and product listings.
//!
//! Full pages and HTMX fragments share the same partial templates: a page
//! includes them inside its slot elements, and [`SlotUpdates`] wraps them for
//! out-of-band swaps.

mod slots;

pub use slots::{HostPage, Slot, SlotUpdates};

use askama::Template;
use askama_web::WebTemplate;
use cartwheel_core::{Cart, LineItem, Product};

use crate::filters;

// =============================================================================
// View Models
// =============================================================================

/// One cart row.
#[derive(Debug, Clone)]
pub struct CartItemView {
    pub id: String,
    pub name: String,
    pub image: String,
    pub price: String,
    pub quantity: u32,
    pub subtotal: String,
}

impl From<&LineItem> for CartItemView {
    fn from(item: &LineItem) -> Self {
        Self {
            id: item.id().to_string(),
            name: item.product.name.clone(),
            image: item.product.image.clone(),
            price: item.product.price.display(),
            quantity: item.quantity(),
            subtotal: item.subtotal().display(),
        }
    }
}

/// Cart display data for templates.
#[derive(Debug, Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub total: String,
    pub count: u64,
}

impl CartView {
    /// Whether checkout should be offered.
    #[must_use]
    pub fn can_checkout(&self) -> bool {
        !self.items.is_empty()
    }
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            items: cart.items().iter().map(CartItemView::from).collect(),
            total: cart.total().display(),
            count: cart.total_quantity(),
        }
    }
}

/// One product card.
#[derive(Debug, Clone)]
pub struct ProductCardView {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Formatted for display, e.g. `$9.99`.
    pub price: String,
    /// Bare decimal amount posted back on add-to-cart, e.g. `9.99`.
    pub price_value: String,
}

impl From<&Product> for ProductCardView {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.name.clone(),
            image: product.image.clone(),
            price: product.price.display(),
            price_value: product.price.amount().to_string(),
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Product listing page.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsPageTemplate {
    pub page: HostPage,
    pub cart_count: u64,
    pub products: Vec<ProductCardView>,
    /// Grid poll interval; zero disables polling.
    pub refresh_secs: u64,
}

/// Cart page.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartPageTemplate {
    pub page: HostPage,
    pub cart_count: u64,
    pub cart: CartView,
}

/// Cart count badge contents.
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u64,
}

/// Cart rows, or the empty-cart message.
#[derive(Template)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate<'a> {
    pub cart: &'a CartView,
    pub page: HostPage,
}

/// Grand total.
#[derive(Template)]
#[template(path = "partials/cart_total.html")]
pub struct CartTotalTemplate<'a> {
    pub total: &'a str,
}

/// Checkout control.
#[derive(Template)]
#[template(path = "partials/checkout_button.html")]
pub struct CheckoutButtonTemplate {
    pub enabled: bool,
    pub page: HostPage,
}

/// Product cards.
#[derive(Template)]
#[template(path = "partials/products_grid.html")]
pub struct ProductsGridTemplate<'a> {
    pub products: &'a [ProductCardView],
    pub page: HostPage,
}

// =============================================================================
// Slot Rendering
// =============================================================================

/// Update the item counter.
///
/// # Errors
///
/// Returns an error if the template fails to render.
pub fn render_counter(updates: &mut SlotUpdates, cart: &Cart) -> askama::Result<bool> {
    updates.set(
        Slot::CartCounter,
        &CartCountTemplate {
            count: cart.total_quantity(),
        },
    )
}

/// Re-render the cart rows, grand total, and checkout control.
///
/// Returns whether any of those slots exist on the host page.
///
/// # Errors
///
/// Returns an error if a template fails to render.
pub fn render_cart(updates: &mut SlotUpdates, cart: &Cart) -> askama::Result<bool> {
    let view = CartView::from(cart);
    let page = updates.page();
    let container = updates.set(
        Slot::CartContainer,
        &CartItemsTemplate { cart: &view, page },
    )?;
    let total = updates.set(Slot::CartTotal, &CartTotalTemplate { total: &view.total })?;
    let checkout = updates.set(
        Slot::CheckoutButton,
        &CheckoutButtonTemplate {
            enabled: view.can_checkout(),
            page,
        },
    )?;
    Ok(container || total || checkout)
}

/// Re-render the product cards, in the given order.
///
/// # Errors
///
/// Returns an error if the template fails to render.
pub fn render_products(updates: &mut SlotUpdates, products: &[Product]) -> askama::Result<bool> {
    let cards: Vec<_> = products.iter().map(ProductCardView::from).collect();
    let page = updates.page();
    updates.set(
        Slot::ProductsGrid,
        &ProductsGridTemplate {
            products: &cards,
            page,
        },
    )
}
