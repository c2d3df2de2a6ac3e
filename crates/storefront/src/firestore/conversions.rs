//! Conversions between domain types and Firestore documents.
//!
//! Carts are stored as `{items: [..], lastUpdated}` with prices as doubles and
//! quantities as integers, the same shape browser clients of the collection
//! write. Decoding is lenient about number types and normalizes item lists.

use std::num::NonZeroU32;

use cartwheel_core::{Cart, CartProduct, LineItem, Price, Product, ProductId};
use chrono::{DateTime, Utc};

use super::value::{Fields, Value};
use crate::store::CartDocument;

/// Field holding the cart's line items.
pub const ITEMS_FIELD: &str = "items";
/// Field the server stamps on every cart write.
pub const LAST_UPDATED_FIELD: &str = "lastUpdated";
/// Field the catalog is ordered by.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Why a stored document could not be turned into a domain value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field `{field}`: {reason}")]
pub struct DecodeError {
    pub field: String,
    pub reason: String,
}

impl DecodeError {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    fn wrong_type(field: &str, expected: &str, actual: &Value) -> Self {
        Self::new(field, format!("expected {expected}, found {}", actual.kind()))
    }
}

// =============================================================================
// Field Accessors
// =============================================================================

fn required<'a>(fields: &'a Fields, field: &str) -> Result<&'a Value, DecodeError> {
    fields
        .get(field)
        .ok_or_else(|| DecodeError::new(field, "missing"))
}

fn string_field(fields: &Fields, field: &str) -> Result<String, DecodeError> {
    match required(fields, field)? {
        Value::StringValue(s) => Ok(s.clone()),
        other => Err(DecodeError::wrong_type(field, "string", other)),
    }
}

/// Read an optional string, treating `null` like a missing field.
fn optional_string_field(fields: &Fields, field: &str) -> Result<Option<String>, DecodeError> {
    match fields.get(field) {
        None | Some(Value::NullValue(())) => Ok(None),
        Some(Value::StringValue(s)) => Ok(Some(s.clone())),
        Some(other) => Err(DecodeError::wrong_type(field, "string", other)),
    }
}

fn price_field(fields: &Fields, field: &str) -> Result<Price, DecodeError> {
    let price = match required(fields, field)? {
        Value::DoubleValue(d) => Price::from_f64(*d),
        Value::IntegerValue(i) => Price::new((*i).into()),
        Value::StringValue(s) => s.parse(),
        other => return Err(DecodeError::wrong_type(field, "number", other)),
    };
    price.map_err(|e| DecodeError::new(field, e.to_string()))
}

/// Quantities may arrive as integers or as integral doubles.
fn quantity_field(fields: &Fields, field: &str) -> Result<i64, DecodeError> {
    match required(fields, field)? {
        Value::IntegerValue(i) => Ok(*i),
        #[allow(clippy::cast_possible_truncation)] // checked integral and in range below
        Value::DoubleValue(d) if d.fract() == 0.0 && d.abs() < 9.0e15 => Ok(*d as i64),
        other => Err(DecodeError::wrong_type(field, "integer", other)),
    }
}

fn timestamp_field(fields: &Fields, field: &str) -> Option<DateTime<Utc>> {
    match fields.get(field) {
        Some(Value::TimestampValue(ts)) => Some(*ts),
        _ => None,
    }
}

// =============================================================================
// Carts
// =============================================================================

fn encode_line_item(item: &LineItem) -> Value {
    Value::map(Fields::from([
        ("id".to_string(), Value::string(item.id().as_str())),
        ("name".to_string(), Value::string(&item.product.name)),
        (
            "price".to_string(),
            Value::DoubleValue(item.product.price.to_f64()),
        ),
        ("image".to_string(), Value::string(&item.product.image)),
        (
            "quantity".to_string(),
            Value::IntegerValue(i64::from(item.quantity())),
        ),
    ]))
}

/// Encode a cart's item list. `lastUpdated` is set by a server transform.
#[must_use]
pub fn encode_cart(cart: &Cart) -> Fields {
    let items = cart.items().iter().map(encode_line_item).collect();
    Fields::from([(ITEMS_FIELD.to_string(), Value::array(items))])
}

/// Decode one stored line item.
///
/// Returns `Ok(None)` for items whose quantity is zero or negative; a stored
/// item like that means "not in the cart".
fn decode_line_item(value: &Value) -> Result<Option<LineItem>, DecodeError> {
    let Value::MapValue(map) = value else {
        return Err(DecodeError::wrong_type(ITEMS_FIELD, "map", value));
    };
    let fields = &map.fields;

    let quantity = quantity_field(fields, "quantity")?;
    let Some(quantity) = u32::try_from(quantity).ok().and_then(NonZeroU32::new) else {
        if quantity > 0 {
            return Err(DecodeError::new("quantity", "out of range"));
        }
        return Ok(None);
    };

    let id = ProductId::parse(string_field(fields, "id")?)
        .map_err(|e| DecodeError::new("id", e.to_string()))?;
    let product = CartProduct {
        id,
        name: optional_string_field(fields, "name")?.unwrap_or_default(),
        price: price_field(fields, "price")?,
        image: optional_string_field(fields, "image")?.unwrap_or_default(),
    };
    Ok(Some(LineItem::new(product, quantity)))
}

/// Decode a stored cart document.
///
/// A missing `items` field decodes as an empty cart.
///
/// # Errors
///
/// Returns `DecodeError` if an item is malformed.
pub fn decode_cart(fields: &Fields) -> Result<CartDocument, DecodeError> {
    let items = match fields.get(ITEMS_FIELD) {
        None | Some(Value::NullValue(())) => Vec::new(),
        Some(Value::ArrayValue(array)) => array
            .values
            .iter()
            .filter_map(|value| decode_line_item(value).transpose())
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => return Err(DecodeError::wrong_type(ITEMS_FIELD, "array", other)),
    };

    Ok(CartDocument {
        cart: Cart::from_items(items),
        last_updated: timestamp_field(fields, LAST_UPDATED_FIELD),
    })
}

// =============================================================================
// Products
// =============================================================================

/// Encode a product. `createdAt` is included only when known.
#[must_use]
pub fn encode_product(product: &Product) -> Fields {
    let mut fields = Fields::from([
        ("id".to_string(), Value::string(product.id.as_str())),
        ("name".to_string(), Value::string(&product.name)),
        ("price".to_string(), Value::DoubleValue(product.price.to_f64())),
        ("image".to_string(), Value::string(&product.image)),
    ]);
    if let Some(created_at) = product.created_at {
        fields.insert(
            CREATED_AT_FIELD.to_string(),
            Value::TimestampValue(created_at),
        );
    }
    fields
}

/// Decode a catalog document.
///
/// Products written without an `id` field use the document id.
///
/// # Errors
///
/// Returns `DecodeError` if the name or price is missing or malformed.
pub fn decode_product(document_id: &str, fields: &Fields) -> Result<Product, DecodeError> {
    let id = optional_string_field(fields, "id")?.unwrap_or_else(|| document_id.to_string());
    let id = ProductId::parse(id).map_err(|e| DecodeError::new("id", e.to_string()))?;

    Ok(Product {
        id,
        name: string_field(fields, "name")?,
        price: price_field(fields, "price")?,
        image: optional_string_field(fields, "image")?.unwrap_or_default(),
        created_at: timestamp_field(fields, CREATED_AT_FIELD),
    })
}
