//! External access service: token-gated, read-only HTTP on localhost.

mod auth;
pub mod port;
mod protocol;
pub mod routes;
mod server;

pub use auth::*;
pub use protocol::*;
pub use server::*;
