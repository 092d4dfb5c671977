//! Address-space accounting for a single subnet.
//!
//! Everything here is a pure function of a snapshot of the subnet's ranges and
//! allocations; nothing is cached between calls.

mod ordinal;
mod statistics;

pub use statistics::*;
