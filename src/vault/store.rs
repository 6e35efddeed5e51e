//! The secret store: secret values plus their key/category metadata.
//!
//! Mutations follow one pattern: take the write lock, load the whole
//! collection, apply a single logical change, write the whole collection
//! back. Reads skip the lock and see either the old or the new collection.

use super::metadata::MetadataStore;
use super::types::{CategoryRecord, KeyRecord, ViewState, ViewStatePatch};
use crate::error::{Result, VaultError};
use crate::storage::{SecretValueStore, SettingsStore};

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct SecretStore {
    secrets: Arc<dyn SecretValueStore>,
    metadata: MetadataStore,
    write_lock: Mutex<()>,
}

impl SecretStore {
    pub fn new(secrets: Arc<dyn SecretValueStore>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            secrets,
            metadata: MetadataStore::new(settings),
            write_lock: Mutex::new(()),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// All key records in storage order (or the last applied reorder).
    pub async fn list_keys(&self) -> Result<Vec<KeyRecord>> {
        self.metadata.keys().await
    }

    /// Key records whose category equals `category`. `None` or an empty
    /// string returns every record.
    pub async fn list_keys_in_category(&self, category: Option<&str>) -> Result<Vec<KeyRecord>> {
        let keys = self.metadata.keys().await?;
        match category.filter(|c| !c.is_empty()) {
            Some(category) => Ok(keys
                .into_iter()
                .filter(|k| k.category.as_deref() == Some(category))
                .collect()),
            None => Ok(keys),
        }
    }

    /// All categories, ascending by `order`.
    pub async fn list_categories(&self) -> Result<Vec<CategoryRecord>> {
        let mut categories = self.metadata.categories().await?;
        categories.sort_by_key(|c| c.order);
        Ok(categories)
    }

    pub async fn get_value(&self, name: &str) -> Result<Option<String>> {
        self.secrets.get(name).await
    }

    /// Like [`get_value`](Self::get_value), but an absent or empty value is
    /// [`VaultError::NotFound`].
    pub async fn require_value(&self, name: &str) -> Result<String> {
        match self.secrets.get(name).await? {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(VaultError::NotFound(format!("Key \"{name}\" not found"))),
        }
    }

    pub async fn view_state(&self) -> Result<ViewState> {
        let _guard = self.write_lock.lock().await;
        self.metadata.view_state().await
    }

    // ========================================================================
    // Keys
    // ========================================================================

    /// Store a secret value and upsert its key record.
    ///
    /// An existing record keeps its position; its category is replaced only
    /// when `category` is supplied.
    pub async fn store_key(&self, name: &str, value: &str, category: Option<&str>) -> Result<()> {
        validate_name("key", name)?;
        let category = normalize_category(category);

        let _guard = self.write_lock.lock().await;
        self.secrets.set(name, value).await?;

        let mut keys = self.metadata.keys().await?;
        let changed = match keys.iter_mut().find(|k| k.name == name) {
            Some(existing) => match category {
                Some(category) if existing.category.as_deref() != Some(category) => {
                    existing.category = Some(category.to_string());
                    true
                }
                _ => false,
            },
            None => {
                keys.push(KeyRecord::new(name, category.map(String::from)));
                true
            }
        };

        if changed {
            self.metadata.save_keys(&keys).await?;
        }
        info!("Stored key '{}'", name);
        Ok(())
    }

    /// Remove a secret value and its record. Absent keys are not an error.
    pub async fn delete_key(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let keys = self.metadata.keys().await?;
        self.secrets.delete(name).await?;

        let before = keys.len();
        let remaining: Vec<KeyRecord> = keys.into_iter().filter(|k| k.name != name).collect();
        if remaining.len() != before {
            self.metadata.save_keys(&remaining).await?;
            info!("Deleted key '{}'", name);
        } else {
            debug!("Delete of unknown key '{}' ignored", name);
        }
        Ok(())
    }

    /// Assign (or clear) a key's category. No-op if the key is absent.
    pub async fn update_key_category(&self, name: &str, category: Option<&str>) -> Result<()> {
        let category = normalize_category(category);

        let _guard = self.write_lock.lock().await;
        let mut keys = self.metadata.keys().await?;
        let Some(record) = keys.iter_mut().find(|k| k.name == name) else {
            debug!("Category update for unknown key '{}' ignored", name);
            return Ok(());
        };

        record.category = category.map(String::from);
        self.metadata.save_keys(&keys).await
    }

    /// Reorder key records to follow `ordered_names`.
    ///
    /// Records not mentioned are kept, after the reordered prefix, in their
    /// previous relative order. Names with no record become bare records;
    /// blank names are skipped.
    pub async fn update_key_order(&self, ordered_names: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let existing = self.metadata.keys().await?;
        let reordered = merge_key_order(&existing, ordered_names);

        debug!(
            "Reordered {} key(s), {} total",
            ordered_names.len(),
            reordered.len()
        );
        self.metadata.save_keys(&reordered).await
    }

    // ========================================================================
    // Categories
    // ========================================================================

    /// Create a category at the end of the order. Existing names are left
    /// untouched.
    pub async fn create_category(
        &self,
        name: &str,
        icon: Option<&str>,
        color: Option<&str>,
    ) -> Result<()> {
        validate_name("category", name)?;

        let _guard = self.write_lock.lock().await;
        let mut categories = self.metadata.categories().await?;
        if categories.iter().any(|c| c.name == name) {
            debug!("Category '{}' already exists", name);
            return Ok(());
        }

        let order = categories
            .iter()
            .map(|c| c.order)
            .max()
            .map_or(0, |max| max + 1);

        let mut record = CategoryRecord::new(name, order);
        record.icon = icon.map(String::from);
        record.color = color.map(String::from);
        categories.push(record);

        self.metadata.save_categories(&categories).await?;
        info!("Created category '{}' at order {}", name, order);
        Ok(())
    }

    /// Update a category's style hints; only supplied fields change.
    pub async fn update_category_style(
        &self,
        name: &str,
        icon: Option<&str>,
        color: Option<&str>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut categories = self.metadata.categories().await?;
        let Some(record) = categories.iter_mut().find(|c| c.name == name) else {
            return Ok(());
        };

        if let Some(icon) = icon {
            record.icon = Some(icon.to_string());
        }
        if let Some(color) = color {
            record.color = Some(color.to_string());
        }
        self.metadata.save_categories(&categories).await
    }

    /// Delete a category and clear it from every key that referenced it.
    pub async fn delete_category(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let categories = self.metadata.categories().await?;
        let mut keys = self.metadata.keys().await?;

        let before = categories.len();
        let remaining: Vec<CategoryRecord> =
            categories.into_iter().filter(|c| c.name != name).collect();
        if remaining.len() != before {
            self.metadata.save_categories(&remaining).await?;
        }

        let mut cleared = 0usize;
        for key in keys.iter_mut() {
            if key.category.as_deref() == Some(name) {
                key.category = None;
                cleared += 1;
            }
        }
        if cleared > 0 {
            self.metadata.save_keys(&keys).await?;
        }

        info!("Deleted category '{}' ({} key(s) uncategorized)", name, cleared);
        Ok(())
    }

    /// Flip a category's expanded flag. No-op if absent.
    pub async fn toggle_category(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut categories = self.metadata.categories().await?;
        let Some(record) = categories.iter_mut().find(|c| c.name == name) else {
            return Ok(());
        };

        record.expanded = !record.expanded;
        self.metadata.save_categories(&categories).await
    }

    /// Replace the category list with `ordered_names`, assigning `order` by
    /// position.
    ///
    /// Unknown names are created expanded and blank names are skipped.
    /// Categories left out of `ordered_names` are dropped, so callers pass
    /// the full set.
    pub async fn update_category_order(&self, ordered_names: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let existing = self.metadata.categories().await?;
        let reordered = replace_category_order(&existing, ordered_names);

        debug!("Reordered {} category(ies)", reordered.len());
        self.metadata.save_categories(&reordered).await
    }

    // ========================================================================
    // View State
    // ========================================================================

    /// Merge `patch` into the persisted view state and return the result.
    pub async fn update_view_state(&self, patch: ViewStatePatch) -> Result<ViewState> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.metadata.view_state().await?;
        state.apply(&patch);
        self.metadata.save_view_state(&state).await?;
        Ok(state)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if is_blank(name) {
        return Err(VaultError::Validation(format!("{kind} name must not be empty")));
    }
    Ok(())
}

fn is_blank(name: &str) -> bool {
    name.trim().is_empty()
}

/// Treat an empty category string as "uncategorized".
fn normalize_category(category: Option<&str>) -> Option<&str> {
    category.filter(|c| !c.is_empty())
}

fn merge_key_order(existing: &[KeyRecord], ordered_names: &[String]) -> Vec<KeyRecord> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut merged = Vec::with_capacity(existing.len().max(ordered_names.len()));

    for name in ordered_names {
        if is_blank(name) || !seen.insert(name.as_str()) {
            continue;
        }
        let record = existing
            .iter()
            .find(|k| &k.name == name)
            .cloned()
            .unwrap_or_else(|| KeyRecord::bare(name.clone()));
        merged.push(record);
    }

    merged.extend(
        existing
            .iter()
            .filter(|k| !seen.contains(k.name.as_str()))
            .cloned(),
    );
    merged
}

fn replace_category_order(existing: &[CategoryRecord], ordered_names: &[String]) -> Vec<CategoryRecord> {
    let mut seen: HashSet<&str> = HashSet::new();
    ordered_names
        .iter()
        .filter(|name| !is_blank(name) && seen.insert(name.as_str()))
        .enumerate()
        .map(|(index, name)| {
            let order = index as i64;
            match existing.iter().find(|c| &c.name == name) {
                Some(category) => CategoryRecord {
                    order,
                    ..category.clone()
                },
                None => CategoryRecord::new(name.clone(), order),
            }
        })
        .collect()
}
