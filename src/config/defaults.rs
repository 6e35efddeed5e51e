/// Default configuration constants used across the system.

/// Default preferred port for the external access service.
pub const DEFAULT_EXTERNAL_PORT: u16 = 8000;

/// Highest port tried when the preferred one is taken.
pub const DEFAULT_MAX_PORT: u16 = 8100;

/// How long `stop` waits for in-flight requests before aborting the server.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Default file names inside the state directory.
pub const DEFAULT_SECRETS_FILE: &str = "secrets.json";
pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Default log level for the `apivault` target.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Host the external access service binds to. Never exposed beyond loopback.
pub const EXTERNAL_BIND_HOST: &str = "127.0.0.1";
