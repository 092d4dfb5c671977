//! HTTP surface of the region: the JSON API under `/api` and the websocket feed.

pub mod api;
pub mod auth;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod router;
pub mod views;
