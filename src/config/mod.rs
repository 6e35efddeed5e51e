mod defaults;
mod io;
mod types;
mod validation;

pub use defaults::*;
pub use io::*;
pub use types::*;
pub use validation::*;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level vault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub external: ExternalAccessConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,

    /// State directory for persistent data.
    #[serde(skip)]
    pub state_dir: PathBuf,
}

impl Config {
    /// Load configuration from file, environment, and defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(find_config_file);

        let mut config = match config_path {
            Some(config_path) if config_path.exists() => {
                info!("Loading config from {}", config_path.display());
                load_config_file(&config_path)?
            }
            Some(config_path) => {
                anyhow::bail!("Config file '{}' does not exist", config_path.display())
            }
            None => {
                info!("No config file found, using defaults");
                Config::default()
            }
        };

        config.apply_env_overrides();
        if config.state_dir.as_os_str().is_empty() {
            config.state_dir = resolve_state_dir();
        }

        validate_config_object(&config)?;
        Ok(config)
    }

    /// Write default configuration to a file.
    pub fn write_default(path: &str) -> Result<()> {
        let config = Config::default();
        let value = serde_json::to_value(&config)?;
        write_config_file(Path::new(path), &value)
    }

    /// Path of the secret value file.
    pub fn secrets_path(&self) -> PathBuf {
        self.state_dir.join(&self.storage.secrets_file)
    }

    /// Path of the settings document.
    pub fn settings_path(&self) -> PathBuf {
        self.state_dir.join(&self.storage.settings_file)
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("APIVAULT_EXTERNAL_PORT") {
            if let Ok(port) = port.parse() {
                self.external.port = port;
            }
        }

        if let Ok(port) = std::env::var("APIVAULT_MAX_PORT") {
            if let Ok(port) = port.parse() {
                self.external.max_port = port;
            }
        }

        if let Ok(dir) = std::env::var("APIVAULT_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }

        if let Ok(level) = std::env::var("APIVAULT_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            external: ExternalAccessConfig::default(),
            tokens: TokenConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            state_dir: resolve_state_dir(),
        }
    }
}

/// Find the configuration file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("apivault.json"),
        PathBuf::from("apivault.yaml"),
        PathBuf::from("apivault.yml"),
        PathBuf::from("apivault.toml"),
    ];

    for path in &candidates {
        if path.exists() {
            return Some(path.clone());
        }
    }

    // Check home directory
    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".apivault").join("config.json");
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Resolve the state directory for persistent data.
fn resolve_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("APIVAULT_STATE_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .map(|h| h.join(".apivault"))
        .unwrap_or_else(|| PathBuf::from(".apivault"))
}

/// Load configuration from a file path.
fn load_config_file(path: &Path) -> Result<Config> {
    let value = read_config_file(path)?;
    let mut config: Config = serde_json::from_value(value)?;
    config.state_dir = PathBuf::new();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.external.port, 8000);
        assert_eq!(config.external.max_port, 8100);
        assert!(config.external.reclaim_port);
        assert!(!config.tokens.revoke_on_generate);
        assert!(config.tokens.ttl_secs.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("apivault.json");
        fs::write(&file, r#"{"external": {"port": 8050}}"#).unwrap();

        let config = load_config_file(&file).unwrap();
        assert_eq!(config.external.port, 8050);
        assert_eq!(config.external.max_port, 8100);
        assert_eq!(config.storage.secrets_file, "secrets.json");
    }

    #[test]
    fn toml_file_is_supported() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("apivault.toml");
        fs::write(
            &file,
            "[tokens]\nrevokeOnGenerate = true\nttlSecs = 3600\n",
        )
        .unwrap();

        let config = load_config_file(&file).unwrap();
        assert!(config.tokens.revoke_on_generate);
        assert_eq!(config.tokens.ttl_secs, Some(3600));
    }

    #[test]
    fn state_paths_join_state_dir() {
        let mut config = Config::default();
        config.state_dir = PathBuf::from("/tmp/vault");
        assert_eq!(config.secrets_path(), PathBuf::from("/tmp/vault/secrets.json"));
        assert_eq!(
            config.settings_path(),
            PathBuf::from("/tmp/vault/settings.json")
        );
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        let result = Config::load(missing.to_str());
        assert!(result.is_err());
    }

    #[test]
    fn write_default_yaml_is_loadable() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("apivault.yaml");
        Config::write_default(file.to_str().unwrap()).unwrap();

        let config = load_config_file(&file).unwrap();
        assert_eq!(config.external.max_port, DEFAULT_MAX_PORT);
        assert!(config.tokens.ttl_secs.is_none());
    }

    #[test]
    fn write_default_round_trips() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("apivault.json");
        Config::write_default(file.to_str().unwrap()).unwrap();

        let config = load_config_file(&file).unwrap();
        assert_eq!(config.external.port, DEFAULT_EXTERNAL_PORT);
        assert_eq!(config.logging.level, DEFAULT_LOG_LEVEL);
    }
}
