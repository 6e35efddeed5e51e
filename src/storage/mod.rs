//! Durable collaborators consumed by the vault core.
//!
//! Two narrow interfaces sit underneath everything else:
//! - [`SecretValueStore`]: opaque get/set/delete of a secret string by name.
//!   Implementations are expected to encrypt at rest; the core never touches
//!   key material.
//! - [`SettingsStore`]: whole-value blobs keyed by a string. There are no
//!   field-level updates, so callers rewrite entire collections.

mod file;
mod memory;

pub use file::{FileSecretStore, FileSettingsStore};
pub use memory::{MemorySecretStore, MemorySettingsStore};

use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Backing store for secret values.
#[async_trait]
pub trait SecretValueStore: Send + Sync {
    /// Read a secret, `None` if it was never stored.
    async fn get(&self, name: &str) -> Result<Option<String>>;

    /// Write a secret, silently replacing any previous value.
    async fn set(&self, name: &str, value: &str) -> Result<()>;

    /// Remove a secret. Removing an absent name is not an error.
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Backing store for structured settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;
}

// ============================================================================
// Typed Helpers
// ============================================================================

/// Load a typed setting, falling back to `default` when the key is absent.
pub async fn load_setting<T>(store: &dyn SettingsStore, key: &str, default: T) -> Result<T>
where
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(default),
    }
}

/// Serialize and persist a typed setting.
pub async fn save_setting<T>(store: &dyn SettingsStore, key: &str, value: &T) -> Result<()>
where
    T: Serialize + Sync,
{
    let value = serde_json::to_value(value)?;
    store.set(key, value).await
}
