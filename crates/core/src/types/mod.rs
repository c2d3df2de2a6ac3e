//! Core types for Cartwheel.
//!
//! Type-safe wrappers for the identifiers and amounts the cart deals in.

pub mod id;
pub mod price;

pub use id::{IdError, MAX_ID_LEN, ProductId, UserId};
pub use price::{Price, PriceError};
