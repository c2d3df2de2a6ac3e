//! The shopping cart model.
//!
//! A cart is an ordered list of line items keyed by product id. Mutations keep
//! two invariants: a product id appears at most once, and every retained item
//! has a quantity of at least one.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::types::{Price, ProductId};

/// The product attributes a line item carries.
///
/// This is what a product card hands over when the shopper adds it to the
/// cart. It is copied into the cart, so later catalog changes don't alter
/// existing line items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    pub image: String,
}

/// One product entry in the cart with its quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(flatten)]
    pub product: CartProduct,
    quantity: NonZeroU32,
}

impl LineItem {
    /// Create a line item.
    #[must_use]
    pub const fn new(product: CartProduct, quantity: NonZeroU32) -> Self {
        Self { product, quantity }
    }

    #[must_use]
    pub const fn id(&self) -> &ProductId {
        &self.product.id
    }

    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity.get()
    }

    /// Unit price times quantity.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.product.price.times(self.quantity())
    }
}

/// Outcome of [`Cart::change_quantity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// The item is still in the cart with this quantity.
    Updated(u32),
    /// The quantity dropped to zero or below and the item was removed.
    Removed,
    /// No item with that id; the cart is unchanged.
    Missing,
}

/// An ordered collection of line items, unique by product id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<LineItem>", into = "Vec<LineItem>")]
pub struct Cart {
    items: Vec<LineItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from stored items.
    ///
    /// Stored documents may have been written by other clients, so duplicates
    /// are merged into the first occurrence by summing their quantities.
    pub fn from_items(items: impl IntoIterator<Item = LineItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            match cart.position(item.id()) {
                Some(index) => {
                    if let Some(existing) = cart.items.get_mut(index) {
                        existing.quantity = existing.quantity.saturating_add(item.quantity());
                    }
                }
                None => cart.items.push(item),
            }
        }
        cart
    }

    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<LineItem> {
        self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<&LineItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    fn position(&self, id: &ProductId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    /// Add one unit of a product.
    ///
    /// Increments the existing line item, or appends a new one with quantity
    /// one. Returns the resulting quantity.
    pub fn add_or_increment(&mut self, product: CartProduct) -> u32 {
        if let Some(index) = self.position(&product.id)
            && let Some(existing) = self.items.get_mut(index)
        {
            existing.quantity = existing.quantity.saturating_add(1);
            return existing.quantity();
        }

        self.items.push(LineItem::new(product, NonZeroU32::MIN));
        1
    }

    /// Adjust the quantity of a product by `delta`.
    ///
    /// A result of zero or less removes the item.
    pub fn change_quantity(&mut self, id: &ProductId, delta: i64) -> QuantityChange {
        let Some(index) = self.position(id) else {
            return QuantityChange::Missing;
        };
        let Some(item) = self.items.get_mut(index) else {
            return QuantityChange::Missing;
        };

        let next = i64::from(item.quantity()).saturating_add(delta);
        let next = u32::try_from(next).unwrap_or(if next < 0 { 0 } else { u32::MAX });
        match NonZeroU32::new(next) {
            Some(quantity) => {
                item.quantity = quantity;
                QuantityChange::Updated(quantity.get())
            }
            None => {
                self.items.remove(index);
                QuantityChange::Removed
            }
        }
    }

    /// Remove a product. Returns `false` if it wasn't in the cart.
    pub fn delete_item(&mut self, id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id() != id);
        self.items.len() != before
    }

    /// Empty the cart.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sum of all quantities (the header counter).
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity())).sum()
    }

    /// Grand total of all line subtotals.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(LineItem::subtotal).sum()
    }
}

impl From<Vec<LineItem>> for Cart {
    fn from(items: Vec<LineItem>) -> Self {
        Self::from_items(items)
    }
}

impl From<Cart> for Vec<LineItem> {
    fn from(cart: Cart) -> Self {
        cart.items
    }
}
