use super::Config;
use anyhow::Result;
use tracing::warn;

/// Validation errors for configuration.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Longest accepted token lifetime (100 years).
pub const MAX_TOKEN_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Validate a configuration object.
pub fn validate_config(config: &Config) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();

    // Port 0 means "ephemeral", so the search bound does not apply.
    if config.external.port != 0 && config.external.max_port < config.external.port {
        errors.push(ConfigValidationError {
            path: "external.maxPort".to_string(),
            message: format!(
                "maxPort ({}) must not be below port ({})",
                config.external.max_port, config.external.port
            ),
        });
    }

    if config.external.shutdown_timeout_ms == 0 {
        warn!("external.shutdownTimeoutMs is 0; in-flight requests will be cut off on stop");
    }

    match config.tokens.ttl_secs {
        Some(0) => errors.push(ConfigValidationError {
            path: "tokens.ttlSecs".to_string(),
            message: "Token lifetime must be greater than 0 (omit it for non-expiring tokens)"
                .to_string(),
        }),
        Some(secs) if secs > MAX_TOKEN_TTL_SECS => errors.push(ConfigValidationError {
            path: "tokens.ttlSecs".to_string(),
            message: format!(
                "Token lifetime {secs}s exceeds {MAX_TOKEN_TTL_SECS}s (omit it for non-expiring tokens)"
            ),
        }),
        _ => {}
    }

    for (path, value) in [
        ("storage.secretsFile", &config.storage.secrets_file),
        ("storage.settingsFile", &config.storage.settings_file),
    ] {
        if value.trim().is_empty() {
            errors.push(ConfigValidationError {
                path: path.to_string(),
                message: "File name is required".to_string(),
            });
        }
    }

    if config.storage.secrets_file == config.storage.settings_file {
        errors.push(ConfigValidationError {
            path: "storage.settingsFile".to_string(),
            message: "Settings and secrets must live in different files".to_string(),
        });
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigValidationError {
            path: "logging.level".to_string(),
            message: format!("Unknown log level '{}'", config.logging.level),
        });
    }

    errors
}

/// Validate configuration and return Result.
pub fn validate_config_object(config: &Config) -> Result<()> {
    let errors = validate_config(config);
    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        anyhow::bail!("Configuration validation failed:\n{}", messages.join("\n"));
    }
}
