//! Core types for Polycast

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PolycastError;

/// Social platforms Polycast can publish to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    TikTok,
    X,
    Instagram,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::TikTok, Platform::X, Platform::Instagram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::TikTok => "tiktok",
            Platform::X => "x",
            Platform::Instagram => "instagram",
        }
    }

    /// Human-facing name used in error messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::TikTok => "TikTok",
            Platform::X => "X",
            Platform::Instagram => "Instagram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PolycastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tiktok" => Ok(Platform::TikTok),
            "x" | "twitter" => Ok(Platform::X),
            "instagram" => Ok(Platform::Instagram),
            other => Err(PolycastError::InvalidInput(format!(
                "Unknown platform '{}'. Valid options: tiktok, x, instagram",
                other
            ))),
        }
    }
}

/// Lifecycle state of a single platform publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Pending,
    Processing,
    SentToInbox,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Processing => "processing",
            PostStatus::SentToInbox => "sent_to_inbox",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    /// Terminal states are only left through an explicit reprocess
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PostStatus::Published | PostStatus::Failed | PostStatus::SentToInbox
        )
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = PolycastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PostStatus::Pending),
            "processing" => Ok(PostStatus::Processing),
            "sent_to_inbox" => Ok(PostStatus::SentToInbox),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(PolycastError::InvalidInput(format!(
                "Unknown post status '{}'",
                other
            ))),
        }
    }
}

/// What kind of media a post carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
    Carousel,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
            MediaKind::Carousel => "carousel",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = PolycastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(MediaKind::Video),
            "image" => Ok(MediaKind::Image),
            "carousel" => Ok(MediaKind::Carousel),
            other => Err(PolycastError::InvalidInput(format!(
                "Unknown media kind '{}'",
                other
            ))),
        }
    }
}

/// TikTok post options.
///
/// TikTok's content-sharing guidelines require interaction toggles to default
/// to off, so `Default` leaves them disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TikTokSettings {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub privacy_level: String,
    #[serde(default)]
    pub allow_comment: bool,
    #[serde(default)]
    pub allow_duet: bool,
    #[serde(default)]
    pub allow_stitch: bool,
    /// Promoting the creator's own business
    #[serde(default)]
    pub is_brand_content: bool,
    /// Paid partnership
    #[serde(default)]
    pub is_brand_organic: bool,
    /// Photo posts only
    #[serde(default)]
    pub auto_add_music: bool,
    /// `false` sends the upload to the creator's TikTok inbox instead
    #[serde(default = "default_direct_post")]
    pub direct_post: bool,
}

fn default_direct_post() -> bool {
    true
}

impl Default for TikTokSettings {
    fn default() -> Self {
        Self {
            title: String::new(),
            privacy_level: String::new(),
            allow_comment: false,
            allow_duet: false,
            allow_stitch: false,
            is_brand_content: false,
            is_brand_organic: false,
            auto_add_music: false,
            direct_post: true,
        }
    }
}

/// Per-platform options attached to a publish request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiktok: Option<TikTokSettings>,
}

impl PlatformSettings {
    pub fn is_empty(&self) -> bool {
        self.tiktok.is_none()
    }
}

/// One publish attempt for one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: i64,
    pub platform: Platform,
    pub media_url: String,
    pub additional_media_urls: Vec<String>,
    pub caption: String,
    pub media_kind: MediaKind,
    pub settings: Option<PlatformSettings>,
    pub status: PostStatus,
    pub platform_post_id: Option<String>,
    pub share_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub published_at: Option<i64>,
}

impl Post {
    /// Build a fresh `pending` post. `media_urls` must be non-empty; the first
    /// entry becomes the primary media URL.
    pub fn new(
        user_id: i64,
        platform: Platform,
        media_urls: &[String],
        caption: String,
        media_kind: MediaKind,
        settings: Option<PlatformSettings>,
    ) -> Self {
        let (media_url, additional) = match media_urls.split_first() {
            Some((first, rest)) => (first.clone(), rest.to_vec()),
            None => (String::new(), Vec::new()),
        };

        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            platform,
            media_url,
            additional_media_urls: additional,
            caption,
            media_kind,
            settings,
            status: PostStatus::Pending,
            platform_post_id: None,
            share_url: None,
            error_message: None,
            created_at: chrono::Utc::now().timestamp(),
            published_at: None,
        }
    }

    /// Primary URL followed by the carousel extras
    pub fn all_media_urls(&self) -> Vec<String> {
        let mut urls = Vec::with_capacity(1 + self.additional_media_urls.len());
        urls.push(self.media_url.clone());
        urls.extend(self.additional_media_urls.iter().cloned());
        urls
    }
}

/// Stored OAuth credentials for one (user, platform) pair
#[derive(Debug)]
pub struct Token {
    pub user_id: i64,
    pub platform: Platform,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub token_type: String,
    /// Unix seconds
    pub expires_at: i64,
    pub scope: String,
    pub updated_at: i64,
}

/// A user's link to a platform account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConnection {
    pub user_id: i64,
    pub platform: Platform,
    pub platform_user_id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
    pub is_active: bool,
    pub connected_at: i64,
    pub last_used_at: Option<i64>,
}
