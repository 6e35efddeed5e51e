pub mod metadata;
mod store;
mod types;

pub use store::*;
pub use types::*;
