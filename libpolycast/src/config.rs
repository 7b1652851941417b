//! Configuration management for Polycast
//!
//! Configuration lives in a TOML file. A platform is enabled by the presence
//! of its section; leaving a section out keeps that platform unregistered.
//!
//! ```toml
//! [database]
//! path = "~/.local/share/polycast/posts.db"
//!
//! [publishing]
//! poll_interval_secs = 5
//! max_poll_attempts = 60
//!
//! [x]
//! client_id = "..."
//! client_secret = "..."
//! redirect_uri = "https://example.com/callback/x"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
    pub tiktok: Option<TikTokConfig>,
    pub x: Option<XConfig>,
    pub instagram: Option<InstagramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Orchestrator timing knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingConfig {
    /// Seconds between status polls for asynchronous platforms
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Status polls before a publish is declared timed out
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Tokens expiring within this window are refreshed proactively
    #[serde(default = "default_refresh_lookahead_secs")]
    pub refresh_lookahead_secs: i64,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_poll_attempts() -> u32 {
    60
}

fn default_refresh_lookahead_secs() -> i64 {
    7 * 24 * 60 * 60
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_attempts: default_max_poll_attempts(),
            refresh_lookahead_secs: default_refresh_lookahead_secs(),
        }
    }
}

impl PublishingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn refresh_lookahead(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_lookahead_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TikTokConfig {
    pub client_key: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_tiktok_api_base")]
    pub api_base: String,
    #[serde(default = "default_tiktok_auth_url")]
    pub auth_url: String,
    #[serde(default)]
    pub policy: TikTokPolicy,
}

fn default_tiktok_api_base() -> String {
    "https://open.tiktokapis.com".to_string()
}

fn default_tiktok_auth_url() -> String {
    "https://www.tiktok.com/v2/auth/authorize/".to_string()
}

/// TikTok publishing rules that change with TikTok's content policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TikTokPolicy {
    /// Privacy levels accepted for direct posts
    #[serde(default = "default_privacy_levels")]
    pub privacy_levels: Vec<String>,

    /// Privacy levels that may not carry branded content
    #[serde(default = "default_branded_forbidden_levels")]
    pub branded_forbidden_levels: Vec<String>,

    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    /// Whether callers may route uploads to the creator inbox
    #[serde(default = "default_allow_inbox")]
    pub allow_inbox: bool,
}

fn default_privacy_levels() -> Vec<String> {
    vec![
        "PUBLIC_TO_EVERYONE".to_string(),
        "MUTUAL_FOLLOW_FRIENDS".to_string(),
        "FOLLOWER_OF_CREATOR".to_string(),
        "SELF_ONLY".to_string(),
    ]
}

fn default_branded_forbidden_levels() -> Vec<String> {
    vec!["SELF_ONLY".to_string()]
}

fn default_title_max_chars() -> usize {
    150
}

fn default_allow_inbox() -> bool {
    true
}

impl Default for TikTokPolicy {
    fn default() -> Self {
        Self {
            privacy_levels: default_privacy_levels(),
            branded_forbidden_levels: default_branded_forbidden_levels(),
            title_max_chars: default_title_max_chars(),
            allow_inbox: default_allow_inbox(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_x_api_base")]
    pub api_base: String,
    #[serde(default = "default_x_upload_base")]
    pub upload_base: String,
    #[serde(default = "default_x_auth_url")]
    pub auth_url: String,
    /// Longest wait for X to finish processing an uploaded video
    #[serde(default = "default_x_processing_max_wait_secs")]
    pub processing_max_wait_secs: u64,
}

fn default_x_api_base() -> String {
    "https://api.twitter.com".to_string()
}

fn default_x_upload_base() -> String {
    "https://api.x.com".to_string()
}

fn default_x_auth_url() -> String {
    "https://twitter.com/i/oauth2/authorize".to_string()
}

fn default_x_processing_max_wait_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    pub app_id: String,
    pub app_secret: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_instagram_graph_base")]
    pub graph_base: String,
    #[serde(default = "default_instagram_oauth_base")]
    pub oauth_base: String,
    #[serde(default = "default_instagram_auth_url")]
    pub auth_url: String,
    /// Long-lived token refresh; disable for app setups that cannot refresh
    #[serde(default = "default_true")]
    pub refresh_enabled: bool,
    #[serde(default = "default_container_poll_interval_secs")]
    pub container_poll_interval_secs: u64,
    #[serde(default = "default_video_max_wait_secs")]
    pub video_max_wait_secs: u64,
    #[serde(default = "default_photo_max_wait_secs")]
    pub photo_max_wait_secs: u64,
}

fn default_instagram_graph_base() -> String {
    "https://graph.instagram.com".to_string()
}

fn default_instagram_oauth_base() -> String {
    "https://api.instagram.com".to_string()
}

fn default_instagram_auth_url() -> String {
    "https://www.instagram.com/oauth/authorize".to_string()
}

fn default_true() -> bool {
    true
}

fn default_container_poll_interval_secs() -> u64 {
    5
}

fn default_video_max_wait_secs() -> u64 {
    300
}

fn default_photo_max_wait_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration with no platforms enabled
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/polycast/posts.db".to_string(),
            },
            publishing: PublishingConfig::default(),
            tiktok: None,
            x: None,
            instagram: None,
        }
    }

    /// A present platform section must be complete
    pub fn validate(&self) -> Result<()> {
        if let Some(tiktok) = &self.tiktok {
            require("tiktok.client_key", &tiktok.client_key)?;
            require("tiktok.client_secret", &tiktok.client_secret)?;
            require("tiktok.redirect_uri", &tiktok.redirect_uri)?;
        }
        if let Some(x) = &self.x {
            require("x.client_id", &x.client_id)?;
            require("x.client_secret", &x.client_secret)?;
            require("x.redirect_uri", &x.redirect_uri)?;
        }
        if let Some(instagram) = &self.instagram {
            require("instagram.app_id", &instagram.app_id)?;
            require("instagram.app_secret", &instagram.app_secret)?;
            require("instagram.redirect_uri", &instagram.redirect_uri)?;
        }
        if self.publishing.max_poll_attempts == 0 {
            return Err(ConfigError::MissingField(
                "publishing.max_poll_attempts must be at least 1".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(field.to_string()).into());
    }
    Ok(())
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("POLYCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("polycast").join("config.toml"))
}

/// Resolve the database path, honouring an explicit override first
pub fn resolve_db_path(configured: Option<&str>) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("POLYCAST_DB_PATH") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    if let Some(path) = configured {
        return Ok(PathBuf::from(shellexpand::tilde(path).to_string()));
    }

    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("polycast").join("posts.db"))
}
