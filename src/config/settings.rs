//! Application settings and configuration types.
//!
//! Settings are persisted to `~/.config/letterbox/settings.json` (or the
//! platform equivalent) and loaded at startup. A missing file means defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{ConfigError, Result};

const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "letterbox.db";

/// Top-level application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Sync batching, thresholds and provider queries.
    pub sync: SyncSettings,
    /// Classifier rule overrides.
    pub classifier: ClassifierSettings,
    /// OAuth client registrations.
    pub oauth: OAuthSettings,
    /// SQLite database location; defaults to the data directory.
    pub database_path: Option<PathBuf>,
}

impl Settings {
    /// Loads settings from the default location, or defaults if absent.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Loads settings from `path`, or defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    /// Writes settings as pretty-printed JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// `<config dir>/settings.json`, if a home directory can be resolved.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
    }

    /// Resolved database path.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
            .ok_or(ConfigError::NoHomeDirectory)
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "letterbox", "letterbox")
}

/// Sync batching, thresholds and search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Messages fetched concurrently per chunk.
    pub batch_size: usize,
    /// Pause between chunks in milliseconds.
    pub batch_delay_ms: u64,
    /// Minimum score for a candidate to appear in a preview, and for commit
    /// syncs restricted to an accepted-domain list.
    pub preview_threshold: i32,
    /// Minimum score for an unrestricted commit sync to import a message.
    pub commit_threshold: i32,
    /// Search window for accounts that have never synced.
    pub initial_lookback_days: i64,
    /// Upper bound on ids returned by a single query.
    pub max_results_per_query: usize,
    /// Gmail search-syntax queries.
    pub gmail_queries: Vec<String>,
    /// Graph OData `$filter` expressions.
    pub outlook_filters: Vec<String>,
    /// Label (Gmail) or folder (Outlook) for imported newsletters.
    pub newsletter_label: String,
    /// Cap on a single rate-limit back-off, in seconds.
    pub max_retry_after_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay_ms: 500,
            preview_threshold: 35,
            commit_threshold: 40,
            initial_lookback_days: 30,
            max_results_per_query: 100,
            gmail_queries: vec![
                "unsubscribe".to_string(),
                "newsletter".to_string(),
                "subject:(digest OR weekly OR issue OR edition)".to_string(),
                "category:updates".to_string(),
                "category:promotions".to_string(),
            ],
            outlook_filters: vec![
                "contains(subject,'newsletter')".to_string(),
                "contains(subject,'digest')".to_string(),
                "contains(subject,'weekly')".to_string(),
                "contains(subject,'issue')".to_string(),
                "inferenceClassification eq 'other'".to_string(),
            ],
            newsletter_label: "Newsletters".to_string(),
            max_retry_after_secs: 30,
        }
    }
}

/// Classifier configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// JSON rule file replacing the built-in tables.
    pub rules_path: Option<PathBuf>,
}

/// OAuth client registrations per provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub google: Option<OAuthClientSettings>,
    pub microsoft: Option<OAuthClientSettings>,
}

/// A registered OAuth client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthClientSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Azure AD tenant; `common` when unset. Ignored for Google.
    #[serde(default)]
    pub tenant: Option<String>,
}

impl OAuthSettings {
    /// Google client from settings, else from `LETTERBOX_GOOGLE_*` variables.
    pub fn google(&self) -> Option<OAuthClientSettings> {
        self.google.clone().or_else(|| {
            from_env(|name| std::env::var(name).ok(), "GOOGLE")
        })
    }

    /// Microsoft client from settings, else from `LETTERBOX_MICROSOFT_*` variables.
    pub fn microsoft(&self) -> Option<OAuthClientSettings> {
        self.microsoft.clone().or_else(|| {
            from_env(|name| std::env::var(name).ok(), "MICROSOFT")
        })
    }
}

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8765/oauth/callback";

fn from_env(var: impl Fn(&str) -> Option<String>, provider: &str) -> Option<OAuthClientSettings> {
    let client_id = var(&format!("LETTERBOX_{provider}_CLIENT_ID"))?;
    let client_secret = var(&format!("LETTERBOX_{provider}_CLIENT_SECRET"))?;
    let redirect_uri =
        var("LETTERBOX_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
    let tenant = var(&format!("LETTERBOX_{provider}_TENANT"));

    Some(OAuthClientSettings {
        client_id,
        client_secret,
        redirect_uri,
        tenant,
    })
}
