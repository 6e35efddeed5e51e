use super::defaults::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// External Access Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAccessConfig {
    /// Preferred port. A port persisted by a previous successful start wins
    /// over this value. `0` asks the OS for an ephemeral port.
    #[serde(default = "default_external_port")]
    pub port: u16,
    /// Upper bound (inclusive) of the port search.
    #[serde(default = "default_max_port")]
    pub max_port: u16,
    /// Terminate other processes holding a candidate port before binding.
    #[serde(default = "default_true")]
    pub reclaim_port: bool,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for ExternalAccessConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_EXTERNAL_PORT,
            max_port: DEFAULT_MAX_PORT,
            reclaim_port: true,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

// ============================================================================
// Token Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    /// Lifetime of newly generated tokens. Unset means they never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    /// Revoke all earlier tokens whenever a new one is generated.
    #[serde(default)]
    pub revoke_on_generate: bool,
}

// ============================================================================
// Storage Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default = "default_secrets_file")]
    pub secrets_file: String,
    #[serde(default = "default_settings_file")]
    pub settings_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            secrets_file: DEFAULT_SECRETS_FILE.to_string(),
            settings_file: DEFAULT_SETTINGS_FILE.to_string(),
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            json: false,
        }
    }
}

// ============================================================================
// Serde defaults
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_external_port() -> u16 {
    DEFAULT_EXTERNAL_PORT
}

fn default_max_port() -> u16 {
    DEFAULT_MAX_PORT
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

fn default_secrets_file() -> String {
    DEFAULT_SECRETS_FILE.to_string()
}

fn default_settings_file() -> String {
    DEFAULT_SETTINGS_FILE.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
