//! Local API key vault.
//!
//! Secret values live in a [`storage::SecretValueStore`]; names, categories
//! and ordering live as whole-value settings. The [`gateway`] module exposes
//! read-only, token-gated HTTP access on localhost.

pub mod access;
pub mod app;
pub mod cli;
pub mod config;
pub mod demo;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod storage;
pub mod vault;

pub use error::{Result, VaultError};
