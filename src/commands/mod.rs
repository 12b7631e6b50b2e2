//! Command implementations wiring parsed CLI args through to the
//! runner, the fast client, and the echo server.

pub mod curl;
pub mod load;
pub mod server;
