//! Stored cart inspection.

use cartwheel_core::{Cart, UserId};
use cartwheel_storefront::store::CartStore;
use tracing::{info, warn};

use super::firestore_client;

/// Print a shopper's stored cart.
///
/// # Errors
///
/// Returns an error if the identity is malformed, the Firestore configuration
/// is missing, or the read fails.
pub async fn show(user_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let user_id = UserId::parse(user_id)?;
    let client = firestore_client()?;

    let Some(document) = client.fetch(&user_id).await? else {
        warn!(user_id = %user_id, "No stored cart");
        return Ok(());
    };

    let last_updated = document
        .last_updated
        .map_or_else(|| "unknown".to_string(), |at| at.to_rfc3339());
    info!("Cart {user_id} (last updated {last_updated})");
    info!("========================");
    if document.cart.is_empty() {
        info!("  (empty)");
    }
    for item in document.cart.items() {
        info!(
            "  {} x{} | {} @ {} = {}",
            item.id(),
            item.quantity(),
            item.product.name,
            item.product.price.display(),
            item.subtotal().display()
        );
    }
    info!(
        "Total: {} ({} items)",
        document.cart.total().display(),
        document.cart.total_quantity()
    );

    Ok(())
}

/// Overwrite a shopper's stored cart with an empty one.
///
/// # Errors
///
/// Returns an error if the identity is malformed, the Firestore configuration
/// is missing, or the write fails.
pub async fn clear(user_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let user_id = UserId::parse(user_id)?;
    let client = firestore_client()?;

    client.save(&user_id, &Cart::new()).await?;
    info!(user_id = %user_id, "Cart cleared");

    Ok(())
}
