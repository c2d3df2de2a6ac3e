//! CLI command implementations.

pub mod cart;
pub mod catalog;

use std::time::Duration;

use cartwheel_storefront::config::FirestoreConfig;
use cartwheel_storefront::firestore::FirestoreClient;

/// Build a Firestore client from the environment.
///
/// The CLI reads fresh data on every call, so the catalog cache is disabled.
///
/// # Errors
///
/// Returns an error if the Firestore variables are missing or invalid.
pub fn firestore_client() -> Result<FirestoreClient, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = FirestoreConfig::from_env()?;
    tracing::info!(project_id = %config.project_id, database = %config.database, "Using Firestore");
    Ok(FirestoreClient::new(&config, Duration::ZERO)?)
}
