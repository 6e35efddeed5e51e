use thiserror::Error;

/// Errors surfaced by the vault core.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Bad caller input (for example an empty key name).
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Missing, malformed, unknown or expired access token.
    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("unable to find an available port between {start} and {end}")]
    PortExhaustion { start: u16, end: u16 },

    /// Failure reported by a durable collaborator.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;
