//! Anonymous shopper identity.
//!
//! Every browser gets a random `user_xxxxxxxxx` token in the `store_user_id`
//! cookie the first time it visits. The token keys the shopper's cart document
//! and is never tied to an account. A browser that refuses the cookie gets a
//! new token on every request, so its cart lasts one request.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};
use cartwheel_core::UserId;
use rand::Rng;
use tower_sessions::cookie::{Cookie, SameSite, time::Duration};
use tracing::Span;

/// Name of the identity cookie.
pub const IDENTITY_COOKIE: &str = "store_user_id";

/// Number of random base-36 characters after `user_`.
const IDENTITY_RANDOM_LEN: usize = 9;

/// Browsers cap cookie lifetimes at 400 days.
const IDENTITY_MAX_AGE_DAYS: i64 = 400;

/// Cookie attributes for the identity cookie.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConfig {
    /// Mark the cookie `Secure` (site served over https).
    pub secure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Cookie,
    Minted,
}

/// The requesting shopper's anonymous identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shopper(pub UserId, Origin);

impl Shopper {
    /// Generate a fresh identity: `user_` plus 9 random base-36 characters.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let bytes: [u8; IDENTITY_RANDOM_LEN] = std::array::from_fn(|_| rng.random_range(0..36));
        Self(UserId::from_random_bytes(&bytes), Origin::Minted)
    }

    /// A shopper who presented `user_id` in their cookie.
    #[must_use]
    pub const fn returning(user_id: UserId) -> Self {
        Self(user_id, Origin::Cookie)
    }

    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.0
    }

    /// Whether the identity was minted for this request, so no cart can be
    /// stored under it yet.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.1 == Origin::Minted
    }
}

/// Find a valid identity in the request's `Cookie` headers.
///
/// Malformed tokens are ignored, which mints a replacement.
fn identity_from_headers(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == IDENTITY_COOKIE)
        .and_then(|cookie| UserId::parse(cookie.value()).ok())
}

/// Build the `Set-Cookie` value that persists an identity.
fn identity_cookie(user_id: &UserId, config: IdentityConfig) -> Cookie<'static> {
    Cookie::build((IDENTITY_COOKIE, user_id.to_string()))
        .path("/")
        .same_site(SameSite::Lax)
        .http_only(true)
        .secure(config.secure)
        .max_age(Duration::days(IDENTITY_MAX_AGE_DAYS))
        .build()
}

/// Middleware that resolves the shopper identity, minting one when absent.
///
/// The identity is stored in request extensions for the [`Shopper`] extractor,
/// recorded on the current span and Sentry scope, and set as a cookie on the
/// response when it was just created.
pub async fn identity_middleware(
    State(config): State<IdentityConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    let shopper = identity_from_headers(request.headers())
        .map_or_else(Shopper::generate, Shopper::returning);
    let minted = shopper.is_new();

    Span::current().record("user_id", shopper.0.as_str());
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(shopper.0.to_string()),
            ..Default::default()
        }));
    });

    let cookie = minted.then(|| identity_cookie(&shopper.0, config));
    if minted {
        tracing::debug!(user_id = %shopper.0, "Generated new user ID");
    }
    request.extensions_mut().insert(shopper);

    let mut response = next.run(request).await;

    if let Some(cookie) = cookie
        && let Ok(value) = HeaderValue::from_str(&cookie.to_string())
    {
        response.headers_mut().append(header::SET_COOKIE, value);
    }

    response
}

impl<S> FromRequestParts<S> for Shopper
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned().unwrap_or_else(|| {
            tracing::warn!(
                "Shopper identity not found in request extensions - middleware may be misconfigured"
            );
            Self::generate()
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::StatusCode, middleware, routing::get};
    use tower::ServiceExt;

    fn app(config: IdentityConfig) -> Router {
        Router::new()
            .route(
                "/",
                get(|shopper: Shopper| async move { format!("{} {}", shopper.0, shopper.is_new()) }),
            )
            .layer(middleware::from_fn_with_state(config, identity_middleware))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_generated_identity_format() {
        for _ in 0..50 {
            let shopper = Shopper::generate();
            assert!(shopper.is_new());
            let id = shopper.user_id().as_str();
            assert!(id.starts_with("user_"));
            let suffix = &id["user_".len()..];
            assert_eq!(suffix.len(), 9);
            assert!(
                suffix
                    .chars()
                    .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
            );
        }
    }

    #[test]
    fn test_generated_identities_differ() {
        assert_ne!(Shopper::generate(), Shopper::generate());
    }

    #[tokio::test]
    async fn test_new_visitor_gets_cookie() {
        let response = app(IdentityConfig::default())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.starts_with("store_user_id=user_"));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
        assert!(set_cookie.contains("Path=/"));
        assert!(set_cookie.contains("Max-Age=34560000"));
        assert!(!set_cookie.contains("Secure"));

        let body = body_string(response).await;
        let (user_id, is_new) = body.split_once(' ').unwrap();
        assert!(set_cookie.contains(user_id));
        assert_eq!(is_new, "true");
    }

    #[tokio::test]
    async fn test_returning_visitor_keeps_identity() {
        let request = Request::get("/")
            .header(header::COOKIE, "theme=dark; store_user_id=user_abc123xyz")
            .body(Body::empty())
            .unwrap();
        let response = app(IdentityConfig::default()).oneshot(request).await.unwrap();

        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(body_string(response).await, "user_abc123xyz false");
    }

    #[tokio::test]
    async fn test_malformed_identity_is_replaced() {
        let request = Request::get("/")
            .header(header::COOKIE, "store_user_id=../../etc")
            .body(Body::empty())
            .unwrap();
        let response = app(IdentityConfig::default()).oneshot(request).await.unwrap();

        assert!(response.headers().get(header::SET_COOKIE).is_some());
        assert!(body_string(response).await.starts_with("user_"));
    }

    #[tokio::test]
    async fn test_secure_cookie_over_https() {
        let response = app(IdentityConfig { secure: true })
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let set_cookie = response.headers().get(header::SET_COOKIE).unwrap();
        assert!(set_cookie.to_str().unwrap().contains("Secure"));
    }
}
