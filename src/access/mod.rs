//! Bearer tokens for the external access service.

mod tokens;

pub use tokens::*;
