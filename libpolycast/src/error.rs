//! Error types for Polycast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PolycastError>;

#[derive(Error, Debug)]
pub enum PolycastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Platform not connected: {}", .0.join(", "))]
    NotConnected(Vec<String>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Job queue error: {0}")]
    Queue(String),
}

impl PolycastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PolycastError::InvalidInput(_) => 3,
            PolycastError::NotConnected(_) => 3,
            PolycastError::NotFound(_) => 4,
            PolycastError::Platform(PlatformError::Authentication(_)) => 2,
            PolycastError::Platform(PlatformError::AuthExchange(_)) => 2,
            PolycastError::Platform(_) => 1,
            PolycastError::Config(_) => 1,
            PolycastError::Database(_) => 1,
            PolycastError::Queue(_) => 1,
        }
    }

    /// Message suitable for a post record: platform errors lose the
    /// "Platform error:" wrapper
    pub fn detail(&self) -> String {
        match self {
            PolycastError::Platform(inner) => inner.to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid platform adapter: {0}")]
    InvalidAdapter(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Errors raised by platform adapters.
///
/// Cloneable so a single failure can be written to the post record and the
/// per-request error map without re-rendering.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization code exchange failed: {0}")]
    AuthExchange(String),

    #[error("Token refresh not supported: {0}")]
    RefreshUnsupported(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Media upload failed: {0}")]
    Upload(String),

    #[error("Publishing failed: {0}")]
    Publish(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Platform not available: {0}")]
    NotAvailable(String),
}

impl PlatformError {
    /// Whether retrying the same call later could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Network(_) | PlatformError::RateLimit(_))
    }
}
