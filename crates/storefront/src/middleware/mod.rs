//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing, declares `request_id` and `user_id` span fields)
//! 3. Request ID (add unique ID to each request)
//! 4. Identity (resolve or mint the `store_user_id` cookie)

pub mod identity;
pub mod request_id;

pub use identity::{IDENTITY_COOKIE, IdentityConfig, Shopper, identity_middleware};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
