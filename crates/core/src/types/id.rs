//! Newtype IDs for type-safe references to shoppers and products.
//!
//! Use the `define_id!` macro to create string ID wrappers that are validated
//! once, where they enter the system, and can't be mixed up afterwards.

use thiserror::Error;

/// Longest accepted identifier, in bytes.
pub const MAX_ID_LEN: usize = 64;

/// Reasons an identifier is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("{kind} is empty")]
    Empty { kind: &'static str },
    #[error("{kind} is longer than {MAX_ID_LEN} bytes")]
    TooLong { kind: &'static str },
    #[error("{kind} contains invalid character {ch:?}")]
    InvalidChar { kind: &'static str, ch: char },
}

/// Macro to define a validated string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` that validate on the way in
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `Ord`
/// - `parse()`, `as_str()`, `Display`, `FromStr`, `TryFrom<String>`
///
/// The second argument names the entity in error messages, the third is a
/// `fn(char) -> bool` deciding which characters are allowed.
///
/// # Example
///
/// ```rust
/// # use cartwheel_core::define_id;
/// define_id!(CouponCode, "coupon code", char::is_alphanumeric);
///
/// let code = CouponCode::parse("SPRING24").unwrap();
/// assert_eq!(code.as_str(), "SPRING24");
/// assert!(CouponCode::parse("spring sale").is_err());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident, $kind:literal, $allowed:expr) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap an identifier.
            ///
            /// # Errors
            ///
            /// Returns `IdError` if the value is empty, too long, or contains
            /// a disallowed character.
            pub fn parse(value: impl Into<String>) -> ::core::result::Result<Self, $crate::IdError> {
                let value = value.into();
                $crate::types::id::validate(&value, $kind, $allowed)?;
                Ok(Self(value))
            }

            /// Get the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::IdError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::IdError;

            fn try_from(value: String) -> ::core::result::Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Shared validation behind every `define_id!` type.
///
/// # Errors
///
/// Returns the first rule the value breaks.
pub fn validate(value: &str, kind: &'static str, allowed: impl Fn(char) -> bool) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty { kind });
    }
    if value.len() > MAX_ID_LEN {
        return Err(IdError::TooLong { kind });
    }
    if let Some(ch) = value.chars().find(|&c| !allowed(c)) {
        return Err(IdError::InvalidChar { kind, ch });
    }
    Ok(())
}

/// Characters allowed in an anonymous shopper identity.
///
/// Identities become document ids in the cart store, so they stay within a
/// URL- and path-safe alphabet.
const fn is_identity_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Characters allowed in a product id: anything printable except `/`.
fn is_product_char(c: char) -> bool {
    !c.is_control() && c != '/'
}

define_id!(UserId, "user id", is_identity_char);
define_id!(ProductId, "product id", is_product_char);

impl UserId {
    /// Prefix of identities minted by the storefront.
    pub const GENERATED_PREFIX: &'static str = "user_";

    /// Mint an identity from random bytes: the prefix followed by one
    /// base-36 character per byte (`b % 36`).
    ///
    /// Every input yields a valid id. Bytes past the length limit are ignored.
    #[must_use]
    pub fn from_random_bytes(bytes: &[u8]) -> Self {
        let room = MAX_ID_LEN - Self::GENERATED_PREFIX.len();
        let mut token = String::with_capacity(MAX_ID_LEN);
        token.push_str(Self::GENERATED_PREFIX);
        token.extend(bytes.iter().take(room).map(|&b| base36_digit(b % 36)));
        Self(token)
    }
}

/// `0..=9` then `a..=z`; callers pass values below 36.
fn base36_digit(value: u8) -> char {
    if value < 10 {
        char::from(b'0' + value)
    } else {
        char::from(b'a' + (value - 10))
    }
}
