//! Environment-driven settings for the storefront and the admin CLI.
//!
//! A `.env` file in the working directory is read first when present.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `STOREFRONT_HOST` | `127.0.0.1` | bind address |
//! | `STOREFRONT_PORT` | `3000` | listen port |
//! | `STOREFRONT_BASE_URL` | <http://localhost:3000> | public URL; `https` makes the identity cookie `Secure` |
//! | `CART_STORE_BACKEND` | `firestore` | `firestore` or `memory` |
//! | `FIRESTORE_PROJECT_ID` | required for `firestore` | project holding `carts` and `products` |
//! | `FIRESTORE_DATABASE` | `(default)` | database id |
//! | `FIRESTORE_API_KEY` | unset | web API key, sent as `?key=` |
//! | `FIRESTORE_ENDPOINT` | <https://firestore.googleapis.com/v1> | REST root; point at the emulator locally |
//! | `CATALOG_CACHE_TTL_SECS` | `300` | product listing cache lifetime |
//! | `SENTRY_DSN` | unset | error reporting |
//! | `SENTRY_ENVIRONMENT` | unset | Sentry environment tag |

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const DEFAULT_FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1";

/// Keys below this many bits of Shannon entropy per character are rejected.
const API_KEY_MIN_ENTROPY: f64 = 3.3;

/// Fragments that mark a copied-from-docs value rather than a real key.
const API_KEY_PLACEHOLDERS: &[&str] = &[
    "your-", "changeme", "replace", "placeholder", "example", "xxx", "todo", "insert", "api-key",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
    #[error("{var} rejected: {reason}")]
    WeakSecret { var: &'static str, reason: String },
}

/// Where carts and the catalog are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Remote Firestore collections.
    #[default]
    Firestore,
    /// Process memory; everything is lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected `firestore` or `memory`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Public URL the storefront is reached at.
    pub base_url: String,
    pub backend: StoreBackend,
    /// Present exactly when `backend` is [`StoreBackend::Firestore`].
    pub firestore: Option<FirestoreConfig>,
    /// How long a fetched product listing is served from cache.
    pub catalog_cache_ttl: Duration,
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

/// Connection settings for the Firestore REST API.
///
/// `Debug` never prints the API key.
#[derive(Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    /// REST root, e.g. `https://firestore.googleapis.com/v1`.
    pub endpoint: Url,
    pub api_key: Option<SecretString>,
}

impl std::fmt::Debug for FirestoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = if self.api_key.is_some() { "[REDACTED]" } else { "none" };
        write!(
            f,
            "FirestoreConfig {{ projects/{}/databases/{} at {}, api_key: {key} }}",
            self.project_id, self.database, self.endpoint
        )
    }
}

impl Default for StorefrontConfig {
    /// In-memory storefront on localhost, for tests and local runs.
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3000,
            base_url: String::from("http://localhost:3000"),
            backend: StoreBackend::Memory,
            firestore: None,
            catalog_cache_ttl: Duration::from_secs(300),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl StorefrontConfig {
    /// Read the storefront settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a value doesn't parse, the Firestore
    /// project is missing for the Firestore backend, or the API key looks
    /// like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        env::load_dotenv();

        let base_url: Url = env::parse_or("STOREFRONT_BASE_URL", "http://localhost:3000")?;
        let backend = env::parse_or("CART_STORE_BACKEND", "firestore")?;
        let firestore = match backend {
            StoreBackend::Firestore => Some(FirestoreConfig::from_env()?),
            StoreBackend::Memory => None,
        };

        Ok(Self {
            host: env::parse_or("STOREFRONT_HOST", "127.0.0.1")?,
            port: env::parse_or("STOREFRONT_PORT", "3000")?,
            base_url: base_url.as_str().trim_end_matches('/').to_owned(),
            backend,
            firestore,
            catalog_cache_ttl: Duration::from_secs(env::parse_or("CATALOG_CACHE_TTL_SECS", "300")?),
            sentry_dsn: env::optional("SENTRY_DSN"),
            sentry_environment: env::optional("SENTRY_ENVIRONMENT"),
        })
    }

    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl FirestoreConfig {
    /// Read only the Firestore settings. The CLI uses this directly.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the project id is missing, the endpoint is not
    /// a URL, or the API key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        env::load_dotenv();

        let api_key = match env::optional("FIRESTORE_API_KEY") {
            Some(key) => {
                check_api_key(&key).map_err(|reason| ConfigError::WeakSecret {
                    var: "FIRESTORE_API_KEY",
                    reason,
                })?;
                Some(SecretString::from(key))
            }
            None => None,
        };

        Ok(Self {
            project_id: env::required("FIRESTORE_PROJECT_ID")?,
            database: env::optional("FIRESTORE_DATABASE").unwrap_or_else(|| "(default)".into()),
            endpoint: env::parse_or("FIRESTORE_ENDPOINT", DEFAULT_FIRESTORE_ENDPOINT)?,
            api_key,
        })
    }

    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|key| key.expose_secret())
    }
}

/// Thin readers over `std::env` that report which variable was at fault.
mod env {
    use std::str::FromStr;

    use super::ConfigError;

    pub(super) fn load_dotenv() {
        // A missing .env file is the normal production case.
        dotenvy::dotenv().ok();
    }

    /// Set and non-empty, or `None`.
    pub(super) fn optional(var: &'static str) -> Option<String> {
        std::env::var(var).ok().filter(|v| !v.trim().is_empty())
    }

    pub(super) fn required(var: &'static str) -> Result<String, ConfigError> {
        optional(var).ok_or(ConfigError::Missing(var))
    }

    pub(super) fn parse_or<T>(var: &'static str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = optional(var);
        raw.as_deref()
            .unwrap_or(default)
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
            })
    }
}

/// Bits of Shannon entropy per character.
fn entropy_per_char(s: &str) -> f64 {
    let mut counts: BTreeMap<char, u32> = BTreeMap::new();
    let mut total = 0_u32;
    for c in s.chars() {
        *counts.entry(c).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    let total = f64::from(total);
    counts
        .into_values()
        .map(|n| {
            let p = f64::from(n) / total;
            -p * p.log2()
        })
        .sum()
}

/// Reject keys that are obviously not real, returning why.
fn check_api_key(key: &str) -> Result<(), String> {
    let lower = key.to_ascii_lowercase();
    if let Some(hit) = API_KEY_PLACEHOLDERS.iter().find(|p| lower.contains(*p)) {
        return Err(format!("looks like a placeholder (contains `{hit}`)"));
    }
    let bits = entropy_per_char(key);
    if bits < API_KEY_MIN_ENTROPY {
        return Err(format!(
            "too predictable: {bits:.2} bits/char, at least {API_KEY_MIN_ENTROPY} required"
        ));
    }
    Ok(())
}
