//! Type-safe identifier wrappers.
//!
//! Lines, chambers, carriers and recipes are addressed by human-readable
//! keys (`line-1`, `a-hk`, `cart-3f9a21c0`, `rec-anode-default`) because
//! operators type them into the line editor. Faults and event log entries
//! are engine-generated and use UUID v7 (time-ordered) so their lists sort
//! by creation time.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around a [`String`] key with standard derives.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like key.
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Borrow the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }
    };
}

define_key! {
    /// Identifier of a production line.
    LineId
}

define_key! {
    /// Identifier of a process chamber.
    ChamberId
}

define_key! {
    /// Identifier of a carrier ("cart").
    CartId
}

define_key! {
    /// Identifier of a recipe in the external catalog.
    RecipeId
}

/// Eight lowercase hex digits drawn from a fresh UUID v4.
fn short_hex() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex.chars().take(8).collect()
}

impl LineId {
    /// Generate a fresh line id of the form `line-<8 hex>`.
    pub fn generate() -> Self {
        Self(format!("line-{}", short_hex()))
    }
}

impl CartId {
    /// Generate a fresh carrier id of the form `cart-<8 hex>`.
    pub fn generate() -> Self {
        Self(format!("cart-{}", short_hex()))
    }
}

/// Generates a newtype wrapper around a time-ordered [`Uuid`].
macro_rules! define_uuid {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_uuid! {
    /// Unique identifier for an injected simulation fault.
    FaultId
}

define_uuid! {
    /// Unique identifier for an event log entry.
    EventId
}
