//! Wiring of stores, registry and service from a loaded [`Config`].

use crate::access::{TokenPolicy, TokenRegistry};
use crate::config::Config;
use crate::error::Result;
use crate::gateway::ExternalAccessService;
use crate::storage::{FileSecretStore, FileSettingsStore, SecretValueStore, SettingsStore};
use crate::vault::SecretStore;

use std::sync::Arc;
use tracing::debug;

/// Everything a command needs, opened once per process.
pub struct VaultContext {
    pub config: Config,
    pub settings: Arc<dyn SettingsStore>,
    pub store: Arc<SecretStore>,
    pub tokens: Arc<TokenRegistry>,
}

impl VaultContext {
    /// Open the file-backed stores under the configured state directory.
    pub async fn open(config: Config) -> Result<Self> {
        let secrets: Arc<dyn SecretValueStore> =
            Arc::new(FileSecretStore::new(config.secrets_path()));
        let settings: Arc<dyn SettingsStore> =
            Arc::new(FileSettingsStore::new(config.settings_path()));
        debug!("Opened vault state in {}", config.state_dir.display());

        Self::with_stores(config, secrets, settings).await
    }

    /// Build a context over caller-supplied stores.
    pub async fn with_stores(
        config: Config,
        secrets: Arc<dyn SecretValueStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        let store = Arc::new(SecretStore::new(secrets, settings.clone()));
        let tokens = Arc::new(
            TokenRegistry::load(settings.clone(), TokenPolicy::from(&config.tokens)).await?,
        );

        Ok(Self {
            config,
            settings,
            store,
            tokens,
        })
    }

    pub fn external_access(&self) -> ExternalAccessService {
        ExternalAccessService::new(
            self.store.clone(),
            self.tokens.clone(),
            self.settings.clone(),
            self.config.external.clone(),
        )
    }
}
