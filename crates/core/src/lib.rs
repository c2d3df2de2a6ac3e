//! Cartwheel Core - Shared cart and catalog types.
//!
//! This crate provides the domain model used by every Cartwheel component:
//! - `storefront` - Public shop serving the product listing and cart pages
//! - `cli` - Operator tools for seeding the catalog and inspecting carts
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no HTTP
//! clients, no clocks. Persistence and rendering live in the storefront.
//!
//! # Modules
//!
//! - [`types`] - Validated ids and non-negative prices
//! - [`cart`] - The cart model and its mutations
//! - [`product`] - Catalog records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod product;
pub mod types;

pub use cart::{Cart, CartProduct, LineItem, QuantityChange};
pub use product::Product;
pub use types::*;
