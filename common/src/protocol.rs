//! Wire types for region ↔ rack agent communication.
//!
//! - The region serializes requests and deserializes responses with serde.
//! - The rack agent deserializes requests and serializes responses with miniserde.
//!
//! Both sides agree on field names, so the JSON is identical either way.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "agent")]
use miniserde::{Deserialize as MiniDeserialize, Serialize as MiniSerialize};
#[cfg(feature = "region")]
use serde::{Deserialize, Serialize};

// Defines an enum together with its wire string in both directions.
macro_rules! define_enum_with_str {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $str:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant,
            )*
        }

        impl $name {
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match *self {
                    $($name::$variant => $str,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($str => Ok($name::$variant),)*
                    _ => Err(()),
                }
            }
        }
    };
}

define_enum_with_str! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Operations a rack agent understands.
    pub enum RackOperation {
        /// Report neighbours observed inside the requested CIDRs.
        Scan => "scan",
        /// Liveness check; answered with an empty discovery list.
        Status => "status",
    }
}

/// Request sent from the region to a rack agent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "agent", derive(MiniDeserialize, MiniSerialize))]
#[cfg_attr(feature = "region", derive(Deserialize, Serialize))]
pub struct RackRequest {
    pub operation: String,
    pub cidrs: Vec<String>,
}

impl RackRequest {
    #[must_use]
    pub fn new(operation: RackOperation, cidrs: Vec<String>) -> Self {
        Self {
            operation: operation.to_string(),
            cidrs,
        }
    }

    /// Parses the operation field; `None` for unknown operations.
    #[must_use]
    pub fn operation(&self) -> Option<RackOperation> {
        self.operation.parse().ok()
    }
}

/// A single neighbour observation reported by a rack agent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "agent", derive(MiniDeserialize, MiniSerialize))]
#[cfg_attr(feature = "region", derive(Deserialize, Serialize))]
pub struct Discovery {
    pub mac: String,
    pub ip: String,
    /// Unix seconds.
    #[cfg_attr(any(feature = "agent", feature = "region"), serde(rename = "observedAt"))]
    pub observed_at: u64,
}

/// Response sent from a rack agent back to the region.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "agent", derive(MiniDeserialize, MiniSerialize))]
#[cfg_attr(feature = "region", derive(Deserialize, Serialize))]
pub struct RackResponse {
    pub discoveries: Vec<Discovery>,
    pub error: Option<String>,
}

impl RackResponse {
    #[must_use]
    pub const fn ok(discoveries: Vec<Discovery>) -> Self {
        Self {
            discoveries,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            discoveries: Vec::new(),
            error: Some(message.into()),
        }
    }
}
