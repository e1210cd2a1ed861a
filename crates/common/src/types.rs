use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares an opaque, string-backed correlation token.
///
/// The services only ever compare, hash, print and serialize these values;
/// no format is assumed, so ids minted elsewhere round-trip untouched.
macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an existing token.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the token as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the id and returns the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    /// Identity of one saga, minted when an order passes the availability check.
    SagaId
);

opaque_id!(
    /// Identity of the order a saga is trying to create.
    OrderId
);

opaque_id!(
    /// Identity of the user placing an order.
    UserId
);

opaque_id!(
    /// Identity of a catalogue product.
    ProductId
);

impl SagaId {
    /// Mints a fresh random saga id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl OrderId {
    /// Mints a fresh random order id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
