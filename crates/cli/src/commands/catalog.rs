//! Product catalog seeding and listing.
//!
//! A catalog file lists products in the order the storefront should show
//! them:
//!
//! ```yaml
//! products:
//!   - id: green-tea
//!     name: Green Tea
//!     price: 4.50
//!     image: /images/green-tea.jpg
//! ```

use std::path::Path;

use cartwheel_core::{Price, Product, ProductId};
use cartwheel_storefront::store::ProductCatalog;
use serde::Deserialize;
use tracing::{error, info};

use super::firestore_client;

/// A price as written in YAML: `4.50` or `"4.50"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceField {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct ProductEntry {
    id: String,
    name: String,
    price: PriceField,
    #[serde(default)]
    image: String,
}

/// Parsed catalog file.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    products: Vec<ProductEntry>,
}

/// Problem with one catalog entry.
#[derive(Debug, thiserror::Error)]
enum EntryError {
    #[error("product #{index}: {source}")]
    Id {
        index: usize,
        source: cartwheel_core::IdError,
    },
    #[error("product #{index} ({id}): {source}")]
    Price {
        index: usize,
        id: String,
        source: cartwheel_core::PriceError,
    },
    #[error("product #{index} ({id}): name is empty")]
    EmptyName { index: usize, id: String },
    #[error("product #{index} ({id}): duplicate id")]
    Duplicate { index: usize, id: String },
}

/// Turn parsed entries into products, collecting every problem.
fn validate(file: CatalogFile) -> Result<Vec<Product>, Vec<EntryError>> {
    let mut products: Vec<Product> = Vec::with_capacity(file.products.len());
    let mut errors = Vec::new();

    for (index, entry) in file.products.into_iter().enumerate() {
        let index = index + 1;
        let id = match ProductId::parse(entry.id) {
            Ok(id) => id,
            Err(source) => {
                errors.push(EntryError::Id { index, source });
                continue;
            }
        };
        let price = match entry.price {
            PriceField::Number(amount) => Price::from_f64(amount),
            PriceField::Text(text) => text.trim().parse(),
        };
        let price = match price {
            Ok(price) => price,
            Err(source) => {
                errors.push(EntryError::Price {
                    index,
                    id: id.to_string(),
                    source,
                });
                continue;
            }
        };
        if entry.name.trim().is_empty() {
            errors.push(EntryError::EmptyName {
                index,
                id: id.to_string(),
            });
            continue;
        }
        if products.iter().any(|existing| existing.id == id) {
            errors.push(EntryError::Duplicate {
                index,
                id: id.to_string(),
            });
            continue;
        }
        products.push(Product {
            id,
            name: entry.name,
            price,
            image: entry.image,
            created_at: None,
        });
    }

    if errors.is_empty() {
        Ok(products)
    } else {
        Err(errors)
    }
}

/// Seed the catalog from a YAML file.
///
/// Products are written last to first: each write is stamped with the server
/// time, and the storefront lists newest first.
///
/// # Errors
///
/// Returns an error if the file can't be read or parsed, an entry is invalid,
/// or a write fails. Entries are validated before anything is written.
pub async fn seed(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");
    let content = tokio::fs::read_to_string(path).await?;
    let file: CatalogFile = serde_yaml::from_str(&content)?;

    let products = match validate(file) {
        Ok(products) => products,
        Err(errors) => {
            error!("Catalog validation failed:");
            for err in &errors {
                error!("  - {err}");
            }
            return Err(format!("{} validation errors found", errors.len()).into());
        }
    };
    info!(products = products.len(), "Catalog validated");

    let client = firestore_client()?;
    for product in products.iter().rev() {
        client.put_product(product).await?;
        info!(product_id = %product.id, name = %product.name, "Wrote product");
    }

    info!("Seeding complete! {} products written", products.len());
    Ok(())
}

/// List the catalog in storefront order.
///
/// # Errors
///
/// Returns an error if the Firestore configuration is missing or the query
/// fails.
pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let client = firestore_client()?;
    let products = client.list_products().await?;

    info!("Catalog ({} products)", products.len());
    info!("========================");
    for product in &products {
        let created = product
            .created_at
            .map_or_else(|| "-".to_string(), |at| at.to_rfc3339());
        info!(
            "  {} | {} | {} | {}",
            product.id,
            product.name,
            product.price.display(),
            created
        );
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> CatalogFile {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_numeric_and_string_prices() {
        let file = parse(
            r#"
products:
  - id: green-tea
    name: Green Tea
    price: 4.50
    image: /images/green-tea.jpg
  - id: mug
    name: Mug
    price: "12"
"#,
        );
        let products = validate(file).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].price.display(), "$4.50");
        assert_eq!(products[1].price.display(), "$12.00");
        assert!(products[1].image.is_empty());
    }

    #[test]
    fn test_collects_every_error() {
        let file = parse(
            r#"
products:
  - id: "a/b"
    name: Slash
    price: 1
  - id: neg
    name: Negative
    price: -2
  - id: blank
    name: "  "
    price: 1
  - id: ok
    name: Fine
    price: 1
  - id: ok
    name: Again
    price: 1
"#,
        );
        let errors = validate(file).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[0], EntryError::Id { index: 1, .. }));
        assert!(matches!(errors[1], EntryError::Price { index: 2, .. }));
        assert!(matches!(errors[2], EntryError::EmptyName { index: 3, .. }));
        assert!(matches!(errors[3], EntryError::Duplicate { index: 5, .. }));
    }

    #[test]
    fn test_missing_products_key_fails_to_parse() {
        assert!(serde_yaml::from_str::<CatalogFile>("items: []").is_err());
    }
}
