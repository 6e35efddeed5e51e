//! File-backed collaborators.
//!
//! Each store is a single JSON document that is rewritten as a whole on
//! every mutation. Writes go to a temp file in the same directory and are
//! renamed over the target, so a crash leaves either the old or the new
//! document on disk.

use super::{SecretValueStore, SettingsStore};
use crate::error::{Result, VaultError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::debug;

// ============================================================================
// Settings
// ============================================================================

/// Settings persisted as one JSON object on disk.
pub struct FileSettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut document: BTreeMap<String, serde_json::Value> =
            read_document(self.path.clone()).await?;
        Ok(document.remove(key))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document: BTreeMap<String, serde_json::Value> =
            read_document(self.path.clone()).await?;
        document.insert(key.to_string(), value);
        write_document(self.path.clone(), document).await?;
        debug!("Persisted setting '{}' to {}", key, self.path.display());
        Ok(())
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// Secret values persisted in an owner-only (`0600`) JSON file.
///
/// This is a plain local file. Hosts that have a platform keychain should
/// provide their own [`SecretValueStore`] instead.
pub struct FileSecretStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SecretValueStore for FileSecretStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        let mut values: BTreeMap<String, String> = read_document(self.path.clone()).await?;
        Ok(values.remove(name))
    }

    async fn set(&self, name: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values: BTreeMap<String, String> = read_document(self.path.clone()).await?;
        values.insert(name.to_string(), value.to_string());
        write_document(self.path.clone(), values).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values: BTreeMap<String, String> = read_document(self.path.clone()).await?;
        if values.remove(name).is_some() {
            write_document(self.path.clone(), values).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Document I/O
// ============================================================================

async fn read_document<T>(path: PathBuf) -> Result<BTreeMap<String, T>>
where
    T: DeserializeOwned + Send + 'static,
{
    tokio::task::spawn_blocking(move || read_document_blocking(&path))
        .await
        .map_err(|e| VaultError::Storage(format!("read task failed: {e}")))?
}

async fn write_document<T>(path: PathBuf, document: BTreeMap<String, T>) -> Result<()>
where
    T: Serialize + Send + 'static,
{
    tokio::task::spawn_blocking(move || write_document_blocking(&path, &document))
        .await
        .map_err(|e| VaultError::Storage(format!("write task failed: {e}")))?
}

fn read_document_blocking<T: DeserializeOwned>(path: &Path) -> Result<BTreeMap<String, T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };

    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    Ok(serde_json::from_str(&content)?)
}

fn write_document_blocking<T: Serialize>(path: &Path, document: &BTreeMap<String, T>) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    serde_json::to_writer_pretty(&mut tmp, document)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path).map_err(|e| VaultError::Io(e.error))?;
    Ok(())
}
