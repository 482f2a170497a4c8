//! Configuration and settings management.
//!
//! This module provides application settings types and persistence.
//! Settings are stored in the user's config directory as JSON.

mod settings;

pub use settings::{
    ClassifierSettings, OAuthClientSettings, OAuthSettings, Settings, SyncSettings,
};

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Settings file could not be read or written.
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid JSON.
    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// No home directory to derive default paths from.
    #[error("could not determine a home directory for default paths")]
    NoHomeDirectory,
}
