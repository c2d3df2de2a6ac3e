//! Named page slots and out-of-band fragment responses.
//!
//! Pages expose a fixed set of element ids. HTMX requests report which page
//! they came from, and fragment responses only target slots that page has.

use std::fmt;

use askama::Template;
use axum::response::Html;
use serde::Deserialize;
use tracing::debug;

/// An element id on a host page that fragments can replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Total item count badge in the header.
    CartCounter,
    /// The list of cart rows, or the empty-cart message.
    CartContainer,
    /// Grand total.
    CartTotal,
    /// Checkout control, disabled for an empty cart.
    CheckoutButton,
    /// Product cards.
    ProductsGrid,
}

impl Slot {
    /// The element id on the page.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::CartCounter => "cart-counter",
            Self::CartContainer => "cart-container",
            Self::CartTotal => "cart-total",
            Self::CheckoutButton => "checkout-button",
            Self::ProductsGrid => "products-grid",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// The page a request was made from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPage {
    Cart,
    Products,
    #[default]
    #[serde(other)]
    Other,
}

impl HostPage {
    const CART_SLOTS: &'static [Slot] = &[
        Slot::CartCounter,
        Slot::CartContainer,
        Slot::CartTotal,
        Slot::CheckoutButton,
    ];
    const PRODUCTS_SLOTS: &'static [Slot] = &[Slot::CartCounter, Slot::ProductsGrid];

    /// Slots this page renders.
    #[must_use]
    pub const fn slots(self) -> &'static [Slot] {
        match self {
            Self::Cart => Self::CART_SLOTS,
            Self::Products => Self::PRODUCTS_SLOTS,
            Self::Other => &[],
        }
    }

    #[must_use]
    pub fn has(self, slot: Slot) -> bool {
        self.slots().contains(&slot)
    }

    /// Value sent back in the `page` form field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::Products => "products",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for HostPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch of out-of-band slot replacements for one HTMX response.
#[derive(Debug)]
pub struct SlotUpdates {
    page: HostPage,
    html: String,
    applied: Vec<Slot>,
}

impl SlotUpdates {
    #[must_use]
    pub const fn new(page: HostPage) -> Self {
        Self {
            page,
            html: String::new(),
            applied: Vec::new(),
        }
    }

    #[must_use]
    pub const fn page(&self) -> HostPage {
        self.page
    }

    /// Replace `slot`'s contents with `fragment`.
    ///
    /// Returns `false` without rendering when the host page has no such slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the fragment template fails to render.
    pub fn set(&mut self, slot: Slot, fragment: &impl Template) -> askama::Result<bool> {
        if !self.page.has(slot) {
            debug!(slot = %slot, page = %self.page, "Slot not on host page, skipping update");
            return Ok(false);
        }
        self.html.push_str("<div id=\"");
        self.html.push_str(slot.id());
        self.html.push_str("\" hx-swap-oob=\"innerHTML\">");
        fragment.render_into(&mut self.html)?;
        self.html.push_str("</div>\n");
        self.applied.push(slot);
        Ok(true)
    }

    /// Slots updated so far, in order.
    #[must_use]
    pub fn applied(&self) -> &[Slot] {
        &self.applied
    }

    #[must_use]
    pub fn into_html(self) -> Html<String> {
        Html(self.html)
    }
}
