//! Platform adapters
//!
//! Every supported platform implements [`PlatformAdapter`], a single
//! capability contract covering OAuth, media upload, post creation and status
//! lookup. The orchestrator never needs to know which concrete adapter it is
//! driving; behavioural differences are described by [`Capabilities`].
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libpolycast::platforms::{PlatformAdapter, PostContent, RemoteStatus};
//! use secrecy::SecretString;
//!
//! # async fn example(adapter: Arc<dyn PlatformAdapter>) -> libpolycast::Result<()> {
//! let token = SecretString::from("access-token".to_string());
//! let content = PostContent::single("Launch day", "https://cdn.example.com/launch.mp4");
//!
//! let outcome = adapter.create_post(&token, &content).await?;
//! if outcome.status == RemoteStatus::Processing {
//!     if let Some(handle) = &outcome.publish_handle {
//!         let report = adapter.post_status(&token, handle).await?;
//!         println!("{:?}", report.status);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::{PlatformError, Result};
use crate::media;
use crate::types::{Platform, PlatformSettings, TikTokSettings};

pub mod http;
pub mod instagram;
pub mod oauth;
pub mod tiktok;
pub mod x;

// Available outside of tests so integration tests can drive the orchestrator
pub mod mock;

/// How a platform reports the outcome of `create_post`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// The create call returns the final result
    Synchronous,
    /// The create call returns a handle that must be polled
    Polled,
}

/// Static description of what an adapter supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub publish_mode: PublishMode,
    /// Media must go through `upload_media` before `create_post`
    pub requires_pre_upload: bool,
    pub requires_pkce: bool,
    pub supports_carousel: bool,
    pub max_images: usize,
    pub max_videos: usize,
    /// Images and videos may share one post
    pub allows_mixed_media: bool,
}

impl Capabilities {
    /// Check a media list against the adapter's count and mixing limits.
    ///
    /// URLs that do not look like images count as videos.
    pub fn check_media(
        &self,
        platform: Platform,
        media_urls: &[String],
    ) -> std::result::Result<(), PlatformError> {
        let images = media_urls.iter().filter(|u| media::is_image_url(u)).count();
        let videos = media_urls.len() - images;
        let name = platform.display_name();

        if media_urls.is_empty() {
            return Err(PlatformError::Validation(format!(
                "{} requires at least one media item",
                name
            )));
        }
        if images > 0 && videos > 0 && !self.allows_mixed_media {
            return Err(PlatformError::Validation(format!(
                "{} does not allow mixing images and videos in one post",
                name
            )));
        }
        if images > self.max_images {
            return Err(PlatformError::Validation(format!(
                "{} allows at most {} images per post, got {}",
                name, self.max_images, images
            )));
        }
        if videos > self.max_videos {
            return Err(PlatformError::Validation(format!(
                "{} allows at most {} videos per post, got {}",
                name, self.max_videos, videos
            )));
        }
        let total_cap = self.max_images.max(self.max_videos);
        if media_urls.len() > total_cap {
            return Err(PlatformError::Validation(format!(
                "{} allows at most {} media items per post, got {}",
                name,
                total_cap,
                media_urls.len()
            )));
        }
        Ok(())
    }
}

/// OAuth authorization redirect
#[derive(Debug, Clone)]
pub struct AuthUrl {
    pub url: String,
    /// CSRF state the callback must echo back
    pub state: String,
    /// PKCE verifier, kept by the caller until the code exchange
    pub code_verifier: Option<String>,
}

/// Extra inputs for the authorization-code exchange
#[derive(Debug, Clone, Default)]
pub struct AuthExtras {
    pub code_verifier: Option<String>,
}

/// Credentials returned by a code exchange or a refresh
#[derive(Debug)]
pub struct TokenGrant {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Seconds from now
    pub expires_in: i64,
    pub token_type: String,
    pub scope: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub platform_user_id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
}

/// What gets published
#[derive(Debug, Clone, Default)]
pub struct PostContent {
    pub text: String,
    pub media_url: String,
    /// Every media URL, primary first
    pub media_urls: Vec<String>,
    /// Handles returned by `upload_media`, in `media_urls` order
    pub media_ids: Vec<String>,
    pub settings: Option<PlatformSettings>,
}

impl PostContent {
    /// Single-media content with no platform settings
    pub fn single(text: &str, media_url: &str) -> Self {
        Self {
            text: text.to_string(),
            media_url: media_url.to_string(),
            media_urls: vec![media_url.to_string()],
            media_ids: Vec::new(),
            settings: None,
        }
    }

    pub fn tiktok_settings(&self) -> Option<&TikTokSettings> {
        self.settings.as_ref().and_then(|s| s.tiktok.as_ref())
    }
}

/// Platform-side state mapped onto Polycast's vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Processing,
    Published,
    SentToInbox,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub platform_post_id: Option<String>,
    /// Handle for `post_status`, set by polled platforms
    pub publish_handle: Option<String>,
    pub status: RemoteStatus,
    pub share_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub status: RemoteStatus,
    pub platform_post_id: Option<String>,
    pub share_url: Option<String>,
    pub fail_reason: Option<String>,
    pub progress_percent: Option<u8>,
}

impl StatusReport {
    pub fn processing() -> Self {
        Self {
            status: RemoteStatus::Processing,
            platform_post_id: None,
            share_url: None,
            fail_reason: None,
            progress_percent: None,
        }
    }
}

/// Capability contract every platform implements
///
/// Access and refresh tokens are passed as [`SecretString`] so they stay out
/// of `Debug` output; adapters expose them only when building requests.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// OAuth scopes the adapter asks for
    fn required_scopes(&self) -> Vec<String>;

    fn capabilities(&self) -> Capabilities;

    /// Build the authorization redirect, generating fresh state (and a PKCE
    /// verifier when the platform requires one)
    fn generate_auth_url(&self) -> Result<AuthUrl>;

    /// # Errors
    ///
    /// `PlatformError::AuthExchange` when the platform rejects the code.
    async fn exchange_code(&self, code: &str, extras: &AuthExtras) -> Result<TokenGrant>;

    /// # Errors
    ///
    /// `PlatformError::RefreshUnsupported` when the platform cannot refresh,
    /// `PlatformError::RefreshFailed` when the refresh call is rejected.
    async fn refresh_access_token(&self, refresh_token: &SecretString) -> Result<TokenGrant>;

    async fn user_info(&self, access_token: &SecretString) -> Result<UserInfo>;

    /// Returns the handle `create_post` expects in `PostContent::media_ids`.
    /// Platforms that pull media by URL validate and echo the URL back.
    async fn upload_media(&self, access_token: &SecretString, media_url: &str) -> Result<String>;

    /// # Errors
    ///
    /// `PlatformError::Publish` on rejection, `PlatformError::Validation`
    /// for content refused before any request is made.
    async fn create_post(
        &self,
        access_token: &SecretString,
        content: &PostContent,
    ) -> Result<PublishOutcome>;

    /// Only meaningful for [`PublishMode::Polled`] platforms
    async fn post_status(
        &self,
        access_token: &SecretString,
        publish_handle: &str,
    ) -> Result<StatusReport>;
}

/// Reject adapters whose self-description cannot be driven.
///
/// Called by the registry at registration time.
pub fn validate_adapter(adapter: &dyn PlatformAdapter) -> std::result::Result<(), String> {
    let caps = adapter.capabilities();
    let name = adapter.platform();

    if adapter.required_scopes().iter().all(|s| s.trim().is_empty()) {
        return Err(format!("{} adapter declares no OAuth scopes", name));
    }
    if caps.max_images == 0 && caps.max_videos == 0 {
        return Err(format!("{} adapter accepts no media", name));
    }
    if caps.supports_carousel && caps.max_images < 2 {
        return Err(format!(
            "{} adapter supports carousels but allows fewer than 2 images",
            name
        ));
    }
    Ok(())
}
