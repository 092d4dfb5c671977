//! Shared pieces of the region ↔ rack agent link.
//!
//! This crate provides:
//! - Timestamped HMAC message signing and validation
//! - The scan request/response wire types
#![expect(
    clippy::missing_errors_doc,
    reason = "The situation it maps to errors should be obvious."
)]

extern crate core;

mod protocol;
mod signing;

pub use protocol::*;
pub use signing::*;

/// Default TCP port a rack agent listens on.
pub const DEFAULT_RACK_AGENT_PORT: u16 = 5248;

/// Upper bound on the size of a single request or response on the agent link.
pub const MAX_MESSAGE_BYTES: u64 = 1024 * 1024;
