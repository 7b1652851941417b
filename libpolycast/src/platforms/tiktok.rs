//! TikTok Content Posting API adapter
//!
//! TikTok pulls media from a public URL, so there is no upload step. Direct
//! posts are asynchronous: `create_post` returns a publish ID that has to be
//! polled through the status endpoint. Inbox uploads finish as soon as TikTok
//! accepts them.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::config::{TikTokConfig, TikTokPolicy};
use crate::error::{PlatformError, Result};
use crate::media;
use crate::types::{Platform, TikTokSettings};

use super::http::{self, endpoint};
use super::oauth;
use super::{
    AuthExtras, AuthUrl, Capabilities, PlatformAdapter, PostContent, PublishMode,
    PublishOutcome, RemoteStatus, StatusReport, TokenGrant, UserInfo,
};

const TOKEN_PATH: &str = "/v2/oauth/token/";
const USER_INFO_PATH: &str = "/v2/user/info/";
const VIDEO_INIT_PATH: &str = "/v2/post/publish/video/init/";
const INBOX_INIT_PATH: &str = "/v2/post/publish/inbox/video/init/";
const CONTENT_INIT_PATH: &str = "/v2/post/publish/content/init/";
const STATUS_PATH: &str = "/v2/post/publish/status/fetch/";

const DEFAULT_SCOPES: &[&str] = &["user.info.basic", "video.publish"];

/// TikTok caps photo posts at 35 images
const MAX_PHOTOS: usize = 35;

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl ApiError {
    fn is_error(&self) -> bool {
        !self.code.is_empty() && self.code != "ok"
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    scope: String,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    user: TikTokUser,
}

#[derive(Debug, Deserialize)]
struct TikTokUser {
    open_id: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    avatar_url: String,
}

#[derive(Debug, Deserialize)]
struct PublishData {
    publish_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    #[serde(default)]
    status: String,
    #[serde(default)]
    share_id: String,
    #[serde(default)]
    fail_reason: String,
    #[serde(default)]
    publicaly_available_post_id: Vec<Value>,
    uploaded_bytes: Option<u64>,
    downloaded_bytes: Option<u64>,
}

/// Title sent to TikTok: the explicit title, or the caption when none is set
pub fn effective_title<'a>(settings: &'a TikTokSettings, caption: &'a str) -> &'a str {
    if settings.title.is_empty() {
        caption
    } else {
        &settings.title
    }
}

/// Check `settings` against the configured TikTok policy.
///
/// Runs before any network call. Returns a publish error describing the first
/// violated rule.
pub fn validate_settings(
    policy: &TikTokPolicy,
    settings: Option<&TikTokSettings>,
    caption: &str,
) -> std::result::Result<(), PlatformError> {
    let settings = settings.ok_or_else(|| {
        PlatformError::Publish("TikTok settings are required, including a privacy level".to_string())
    })?;

    if !settings.direct_post && !policy.allow_inbox {
        return Err(PlatformError::Publish(
            "sending to the TikTok inbox is disabled".to_string(),
        ));
    }

    if settings.direct_post {
        if settings.privacy_level.is_empty() {
            return Err(PlatformError::Publish(
                "privacy level is required for TikTok direct posts".to_string(),
            ));
        }
        if !policy.privacy_levels.contains(&settings.privacy_level) {
            return Err(PlatformError::Publish(format!(
                "invalid privacy level: {}",
                settings.privacy_level
            )));
        }
    }

    let branded = settings.is_brand_content || settings.is_brand_organic;
    if branded && policy.branded_forbidden_levels.contains(&settings.privacy_level) {
        return Err(PlatformError::Publish(format!(
            "branded content cannot be posted with {} visibility",
            settings.privacy_level
        )));
    }

    let title_chars = effective_title(settings, caption).chars().count();
    if title_chars > policy.title_max_chars {
        return Err(PlatformError::Publish(format!(
            "title cannot exceed {} characters (got {})",
            policy.title_max_chars, title_chars
        )));
    }

    Ok(())
}

/// Map TikTok's publish status vocabulary
pub fn map_status(raw: &str) -> RemoteStatus {
    match raw {
        "PUBLISH_COMPLETE" => RemoteStatus::Published,
        "SEND_TO_USER_INBOX" => RemoteStatus::SentToInbox,
        "FAILED" => RemoteStatus::Failed,
        _ => RemoteStatus::Processing,
    }
}

pub struct TikTokAdapter {
    client: Client,
    config: TikTokConfig,
}

impl TikTokAdapter {
    pub fn new(config: TikTokConfig) -> Result<Self> {
        let client = http::build_client(config.timeout_secs)?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.config.api_base, path)
    }

    fn scopes(&self) -> Vec<String> {
        match &self.config.scopes {
            Some(scopes) if !scopes.is_empty() => scopes.clone(),
            _ => DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
        context: &str,
        kind: http::ErrorKind,
    ) -> Result<TokenGrant> {
        let request = self
            .client
            .post(self.url(TOKEN_PATH))
            .header("Cache-Control", "no-cache")
            .form(form);
        let response = http::send(Platform::TikTok, context, request).await?;
        let token: TokenResponse = http::read_json(Platform::TikTok, context, response, kind).await?;

        if let Some(error) = token.error.filter(|e| !e.is_empty()) {
            return Err(kind(format!(
                "TikTok {} rejected: {} {}",
                context,
                error,
                token.error_description.unwrap_or_default()
            ))
            .into());
        }
        if token.access_token.is_empty() {
            return Err(kind(format!("TikTok {} returned no access token", context)).into());
        }

        Ok(TokenGrant {
            access_token: SecretString::from(token.access_token),
            refresh_token: Some(token.refresh_token)
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            expires_in: token.expires_in,
            token_type: if token.token_type.is_empty() {
                "Bearer".to_string()
            } else {
                token.token_type
            },
            scope: token.scope,
        })
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        access_token: &SecretString,
        path: &str,
        body: &Value,
        context: &str,
        kind: http::ErrorKind,
    ) -> Result<T> {
        let request = self
            .client
            .post(self.url(path))
            .bearer_auth(access_token.expose_secret())
            .json(body);
        let response = http::send(Platform::TikTok, context, request).await?;
        let envelope: Envelope<T> = http::read_json(Platform::TikTok, context, response, kind).await?;

        if envelope.error.is_error() {
            return Err(kind(format!(
                "TikTok API error during {}: {} - {}",
                context, envelope.error.code, envelope.error.message
            ))
            .into());
        }

        envelope
            .data
            .ok_or_else(|| kind(format!("TikTok {} response had no data", context)).into())
    }

    fn video_body(content: &PostContent, settings: &TikTokSettings) -> Value {
        let mut post_info = Map::new();
        post_info.insert(
            "title".to_string(),
            json!(effective_title(settings, &content.text)),
        );
        if !settings.privacy_level.is_empty() {
            post_info.insert("privacy_level".to_string(), json!(settings.privacy_level));
        }
        post_info.insert("disable_comment".to_string(), json!(!settings.allow_comment));
        post_info.insert("disable_duet".to_string(), json!(!settings.allow_duet));
        post_info.insert("disable_stitch".to_string(), json!(!settings.allow_stitch));

        // Commercial disclosure is a Direct Post field only
        if settings.direct_post {
            post_info.insert(
                "brand_content_toggle".to_string(),
                json!(settings.is_brand_content || settings.is_brand_organic),
            );
            if settings.is_brand_organic {
                post_info.insert("brand_organic_toggle".to_string(), json!(true));
            }
        }

        json!({
            "post_info": post_info,
            "source_info": {
                "source": "PULL_FROM_URL",
                "video_url": content.media_url,
            },
        })
    }

    fn photo_body(content: &PostContent, settings: &TikTokSettings, images: &[String]) -> Value {
        let mut post_info = Map::new();
        post_info.insert(
            "title".to_string(),
            json!(effective_title(settings, &content.text)),
        );
        post_info.insert("description".to_string(), json!(content.text));
        if !settings.privacy_level.is_empty() {
            post_info.insert("privacy_level".to_string(), json!(settings.privacy_level));
        }
        post_info.insert("disable_comment".to_string(), json!(!settings.allow_comment));
        if settings.is_brand_content || settings.is_brand_organic {
            post_info.insert("brand_content_toggle".to_string(), json!(true));
            post_info.insert(
                "brand_organic_toggle".to_string(),
                json!(settings.is_brand_organic),
            );
        }
        post_info.insert("auto_add_music".to_string(), json!(settings.auto_add_music));

        let post_mode = if settings.direct_post {
            "DIRECT_POST"
        } else {
            "MEDIA_UPLOAD"
        };

        json!({
            "post_info": post_info,
            "source_info": {
                "source": "PULL_FROM_URL",
                "photo_cover_index": 0,
                "photo_images": images,
            },
            "post_mode": post_mode,
            "media_type": "PHOTO",
        })
    }
}

#[async_trait]
impl PlatformAdapter for TikTokAdapter {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn required_scopes(&self) -> Vec<String> {
        self.scopes()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            publish_mode: PublishMode::Polled,
            requires_pre_upload: false,
            requires_pkce: false,
            supports_carousel: true,
            max_images: MAX_PHOTOS,
            max_videos: 1,
            allows_mixed_media: false,
        }
    }

    fn generate_auth_url(&self) -> Result<AuthUrl> {
        let state = oauth::generate_state();
        let scope = self.scopes().join(",");
        let url = oauth::build_url(
            &self.config.auth_url,
            &[
                ("client_key", self.config.client_key.as_str()),
                ("scope", scope.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("state", state.as_str()),
            ],
        )?;

        Ok(AuthUrl {
            url,
            state,
            code_verifier: None,
        })
    }

    async fn exchange_code(&self, code: &str, _extras: &AuthExtras) -> Result<TokenGrant> {
        self.token_request(
            &[
                ("client_key", self.config.client_key.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ],
            "code exchange",
            PlatformError::AuthExchange,
        )
        .await
    }

    async fn refresh_access_token(&self, refresh_token: &SecretString) -> Result<TokenGrant> {
        self.token_request(
            &[
                ("client_key", self.config.client_key.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
            ],
            "token refresh",
            PlatformError::RefreshFailed,
        )
        .await
    }

    async fn user_info(&self, access_token: &SecretString) -> Result<UserInfo> {
        let context = "user info";
        let request = self
            .client
            .get(self.url(USER_INFO_PATH))
            .query(&[("fields", "open_id,display_name,avatar_url")])
            .bearer_auth(access_token.expose_secret());
        let response = http::send(Platform::TikTok, context, request).await?;
        let envelope: Envelope<UserData> =
            http::read_json(Platform::TikTok, context, response, PlatformError::Authentication)
                .await?;

        if envelope.error.is_error() {
            return Err(PlatformError::Authentication(format!(
                "TikTok API error during user info: {} - {}",
                envelope.error.code, envelope.error.message
            ))
            .into());
        }

        let user = envelope
            .data
            .ok_or_else(|| {
                PlatformError::Authentication("TikTok user info response had no data".to_string())
            })?
            .user;

        // The v2 API has no handle, so fall back to the display name
        let username = if user.display_name.is_empty() {
            user.open_id.clone()
        } else {
            user.display_name.clone()
        };

        Ok(UserInfo {
            platform_user_id: user.open_id,
            username,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
        })
    }

    async fn upload_media(&self, _access_token: &SecretString, media_url: &str) -> Result<String> {
        if media_url.trim().is_empty() {
            return Err(PlatformError::Upload("media URL is required for TikTok".to_string()).into());
        }
        Ok(media_url.to_string())
    }

    async fn create_post(
        &self,
        access_token: &SecretString,
        content: &PostContent,
    ) -> Result<PublishOutcome> {
        let media_url = if content.media_url.is_empty() {
            content.media_ids.first().cloned().unwrap_or_default()
        } else {
            content.media_url.clone()
        };
        if media_url.is_empty() {
            return Err(PlatformError::Publish("media URL is required for TikTok posts".to_string()).into());
        }

        validate_settings(&self.config.policy, content.tiktok_settings(), &content.text)?;
        let settings = content.tiktok_settings().cloned().unwrap_or_default();

        let publish: PublishData = if media::is_image_url(&media_url) {
            let images = if content.media_urls.is_empty() {
                vec![media_url.clone()]
            } else {
                content.media_urls.clone()
            };
            if images.len() > MAX_PHOTOS {
                return Err(PlatformError::Publish(format!(
                    "TikTok photo posts allow at most {} images (got {})",
                    MAX_PHOTOS,
                    images.len()
                ))
                .into());
            }
            debug!(images = images.len(), "Initializing TikTok photo post");
            let body = Self::photo_body(content, &settings, &images);
            self.post_json(access_token, CONTENT_INIT_PATH, &body, "photo publish", PlatformError::Publish)
                .await?
        } else {
            let path = if settings.direct_post {
                VIDEO_INIT_PATH
            } else {
                INBOX_INIT_PATH
            };
            debug!(direct_post = settings.direct_post, "Initializing TikTok video post");
            let body = Self::video_body(
                &PostContent {
                    media_url: media_url.clone(),
                    ..content.clone()
                },
                &settings,
            );
            self.post_json(access_token, path, &body, "video publish", PlatformError::Publish)
                .await?
        };

        info!(publish_id = %publish.publish_id, "TikTok accepted publish request");

        let status = if settings.direct_post {
            RemoteStatus::Processing
        } else {
            RemoteStatus::SentToInbox
        };

        Ok(PublishOutcome {
            platform_post_id: None,
            publish_handle: Some(publish.publish_id),
            status,
            share_url: None,
        })
    }

    async fn post_status(
        &self,
        access_token: &SecretString,
        publish_handle: &str,
    ) -> Result<StatusReport> {
        let data: StatusData = self
            .post_json(
                access_token,
                STATUS_PATH,
                &json!({ "publish_id": publish_handle }),
                "status fetch",
                PlatformError::Publish,
            )
            .await?;

        let status = map_status(&data.status);

        let platform_post_id = data
            .publicaly_available_post_id
            .first()
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .or_else(|| Some(publish_handle.to_string()));

        let share_url = if status == RemoteStatus::Published {
            let share_id = if data.share_id.is_empty() {
                platform_post_id.clone()
            } else {
                Some(data.share_id.clone())
            };
            share_id.map(|id| format!("https://www.tiktok.com/@user/video/{}", id))
        } else {
            None
        };

        let progress_percent = match (data.downloaded_bytes, data.uploaded_bytes) {
            (Some(down), Some(up)) if down > 0 => Some(((up.min(down) * 100) / down) as u8),
            _ => None,
        };

        Ok(StatusReport {
            status,
            platform_post_id,
            share_url,
            fail_reason: Some(data.fail_reason).filter(|r| !r.is_empty()),
            progress_percent,
        })
    }
}
