//! Echo/debug server: response shaping grammar plus the axum handler.

pub mod grammar;
pub mod server;
