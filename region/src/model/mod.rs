//! Plain data records of the inventory.
//!
//! Every enumeration that gets persisted or crosses the API carries a small
//! fixed integer code. The code ↔ name tables here are part of the external
//! contract and must not be renumbered.

// Defines a `#[repr(u8)]` enum with its stable code and upper-case name.
macro_rules! define_coded_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident = $code:literal => $label:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(u8)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant = $code,
            )*
        }

        impl $name {
            /// Every variant, in code order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)*];

            #[must_use]
            pub const fn code(self) -> u8 {
                self as u8
            }

            #[must_use]
            pub const fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)*
                    _ => None,
                }
            }

            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)*
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

mod address;
mod host;
mod network;

pub use address::*;
pub use host::*;
pub use network::*;

pub type HostId = i64;
pub type SubnetId = i64;
pub type RangeId = i64;
pub type InterfaceId = i64;
pub type AddressId = i64;
