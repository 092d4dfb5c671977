//! Configuration of the region service: data types and loading of the TOML file.
//!
//! Watching the file for changes lives in [`crate::app`], since applying a change
//! touches application state.

mod loader;
mod types;

pub use loader::*;
pub use types::*;
