//! In-memory collaborators, used by tests and ephemeral vaults.

use super::{SecretValueStore, SettingsStore};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Secret values held in process memory only.
#[derive(Default)]
pub struct MemorySecretStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretValueStore for MemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(name).cloned())
    }

    async fn set(&self, name: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.values.write().remove(name);
        Ok(())
    }
}

/// Settings held in process memory only.
#[derive(Default)]
pub struct MemorySettingsStore {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently present, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}
