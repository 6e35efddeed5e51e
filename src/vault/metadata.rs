//! Key, category and view-state collections over the settings store.
//!
//! Every write replaces the whole collection. Callers that need
//! read-modify-write atomicity must hold the secret store's write lock.

use super::types::{CategoryRecord, KeyRecord, ViewState};
use crate::error::Result;
use crate::storage::{load_setting, save_setting, SettingsStore};
use std::sync::Arc;

pub const KEYS_SETTING: &str = "api-vault-keys";
pub const CATEGORIES_SETTING: &str = "api-vault-categories";
pub const VIEW_STATE_SETTING: &str = "api-vault-view-state";

pub struct MetadataStore {
    settings: Arc<dyn SettingsStore>,
}

impl MetadataStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    pub async fn keys(&self) -> Result<Vec<KeyRecord>> {
        load_setting(self.settings.as_ref(), KEYS_SETTING, Vec::new()).await
    }

    pub async fn save_keys(&self, keys: &[KeyRecord]) -> Result<()> {
        save_setting(self.settings.as_ref(), KEYS_SETTING, &keys).await
    }

    /// Categories in stored order (not sorted).
    pub async fn categories(&self) -> Result<Vec<CategoryRecord>> {
        load_setting(self.settings.as_ref(), CATEGORIES_SETTING, Vec::new()).await
    }

    pub async fn save_categories(&self, categories: &[CategoryRecord]) -> Result<()> {
        save_setting(self.settings.as_ref(), CATEGORIES_SETTING, &categories).await
    }

    /// Read the view state, persisting defaults on first access.
    pub async fn view_state(&self) -> Result<ViewState> {
        match self.settings.get(VIEW_STATE_SETTING).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => {
                let state = ViewState::default();
                self.save_view_state(&state).await?;
                Ok(state)
            }
        }
    }

    pub async fn save_view_state(&self, state: &ViewState) -> Result<()> {
        save_setting(self.settings.as_ref(), VIEW_STATE_SETTING, state).await
    }
}
