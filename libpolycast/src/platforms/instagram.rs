//! Instagram Graph API adapter (Instagram Login for Business)
//!
//! Publishing is a three step container protocol: create a media container,
//! wait for it to reach `FINISHED`, then publish it. Carousels create one
//! container per child and a parent `CAROUSEL` container that references
//! them. The adapter runs the whole protocol inside `create_post`, so from
//! the orchestrator's point of view Instagram is synchronous.

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::InstagramConfig;
use crate::error::{PlatformError, Result};
use crate::media;
use crate::types::Platform;

use super::http::{self, endpoint};
use super::oauth;
use super::{
    AuthExtras, AuthUrl, Capabilities, PlatformAdapter, PostContent, PublishMode,
    PublishOutcome, RemoteStatus, StatusReport, TokenGrant, UserInfo,
};

const DEFAULT_SCOPES: &[&str] = &[
    "instagram_business_basic",
    "instagram_business_content_publish",
];

/// Lifetime of a long-lived token when Instagram omits `expires_in`
const LONG_LIVED_TTL_SECS: i64 = 60 * 24 * 60 * 60;

/// Lifetime of the short-lived token from the code exchange
const SHORT_LIVED_TTL_SECS: i64 = 60 * 60;

const MIN_CAROUSEL_ITEMS: usize = 2;
const MAX_CAROUSEL_ITEMS: usize = 10;

#[derive(Debug, Deserialize)]
struct ShortLivedToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct LongLivedToken {
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct Me {
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    profile_picture_url: String,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    #[serde(default)]
    status_code: String,
}

#[derive(Debug, Deserialize)]
struct Permalink {
    #[serde(default)]
    permalink: String,
}

/// Kind of container to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Reel,
    Photo,
    CarouselVideo,
    CarouselPhoto,
}

impl Container {
    fn for_media(media_url: &str, carousel_item: bool) -> Self {
        match (media::is_image_url(media_url), carousel_item) {
            (true, false) => Container::Photo,
            (false, false) => Container::Reel,
            (true, true) => Container::CarouselPhoto,
            (false, true) => Container::CarouselVideo,
        }
    }

    fn is_video(&self) -> bool {
        matches!(self, Container::Reel | Container::CarouselVideo)
    }
}

pub struct InstagramAdapter {
    client: Client,
    config: InstagramConfig,
}

impl InstagramAdapter {
    pub fn new(config: InstagramConfig) -> Result<Self> {
        let client = http::build_client(config.timeout_secs)?;
        Ok(Self { client, config })
    }

    fn graph(&self, path: &str) -> String {
        endpoint(&self.config.graph_base, path)
    }

    fn scopes(&self) -> Vec<String> {
        match &self.config.scopes {
            Some(scopes) if !scopes.is_empty() => scopes.clone(),
            _ => DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Swap a short-lived token for a 60 day one
    async fn exchange_long_lived(&self, short_lived: &str) -> Result<LongLivedToken> {
        let context = "long-lived token exchange";
        let request = self.client.get(self.graph("/access_token")).query(&[
            ("grant_type", "ig_exchange_token"),
            ("client_secret", self.config.app_secret.as_str()),
            ("access_token", short_lived),
        ]);
        let response = http::send(Platform::Instagram, context, request).await?;
        http::read_json(Platform::Instagram, context, response, PlatformError::AuthExchange).await
    }

    async fn create_container(
        &self,
        access_token: &SecretString,
        ig_user_id: &str,
        params: Vec<(&str, String)>,
    ) -> Result<String> {
        let context = "media container creation";
        let request = self
            .client
            .post(self.graph(&format!("/{}/media", ig_user_id)))
            .query(&[("access_token", access_token.expose_secret())])
            .form(&params);
        let response = http::send(Platform::Instagram, context, request).await?;
        let created: Created =
            http::read_json(Platform::Instagram, context, response, PlatformError::Publish).await?;
        debug!(container_id = %created.id, "Created Instagram container");
        Ok(created.id)
    }

    async fn create_media_container(
        &self,
        access_token: &SecretString,
        ig_user_id: &str,
        media_url: &str,
        kind: Container,
        caption: Option<&str>,
    ) -> Result<String> {
        let mut params: Vec<(&str, String)> = Vec::new();
        match kind {
            Container::Reel => {
                params.push(("media_type", "REELS".to_string()));
                params.push(("video_url", media_url.to_string()));
            }
            Container::CarouselVideo => {
                params.push(("media_type", "VIDEO".to_string()));
                params.push(("video_url", media_url.to_string()));
            }
            Container::Photo | Container::CarouselPhoto => {
                params.push(("image_url", media_url.to_string()));
            }
        }
        if matches!(kind, Container::CarouselPhoto | Container::CarouselVideo) {
            params.push(("is_carousel_item", "true".to_string()));
        }
        if let Some(caption) = caption.filter(|c| !c.is_empty()) {
            params.push(("caption", caption.to_string()));
        }

        self.create_container(access_token, ig_user_id, params).await
    }

    async fn container_status(&self, access_token: &SecretString, container_id: &str) -> Result<String> {
        let context = "container status";
        let request = self
            .client
            .get(self.graph(&format!("/{}", container_id)))
            .query(&[
                ("fields", "status_code"),
                ("access_token", access_token.expose_secret()),
            ]);
        let response = http::send(Platform::Instagram, context, request).await?;
        let status: ContainerStatus =
            http::read_json(Platform::Instagram, context, response, PlatformError::Publish).await?;
        Ok(status.status_code)
    }

    /// Poll a container until it is `FINISHED`
    async fn wait_for_container(
        &self,
        access_token: &SecretString,
        container_id: &str,
        max_wait_secs: u64,
    ) -> Result<()> {
        let interval = self.config.container_poll_interval_secs;
        let attempts = (max_wait_secs / interval.max(1)).max(1);

        for attempt in 1..=attempts {
            match self.container_status(access_token, container_id).await?.as_str() {
                "FINISHED" | "PUBLISHED" => return Ok(()),
                "ERROR" | "EXPIRED" => {
                    return Err(PlatformError::Publish(format!(
                        "Instagram could not process media container {}",
                        container_id
                    ))
                    .into())
                }
                other => {
                    debug!(container_id, status = other, attempt, "Instagram container not ready");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(Duration::from_secs(interval)).await;
            }
        }

        Err(PlatformError::Publish(format!(
            "Instagram media processing timeout after {} seconds",
            max_wait_secs
        ))
        .into())
    }

    fn max_wait_for(&self, kind: Container) -> u64 {
        if kind.is_video() {
            self.config.video_max_wait_secs
        } else {
            self.config.photo_max_wait_secs
        }
    }

    async fn publish_container(
        &self,
        access_token: &SecretString,
        ig_user_id: &str,
        container_id: &str,
    ) -> Result<String> {
        let context = "media publish";
        let request = self
            .client
            .post(self.graph(&format!("/{}/media_publish", ig_user_id)))
            .query(&[("access_token", access_token.expose_secret())])
            .form(&[("creation_id", container_id)]);
        let response = http::send(Platform::Instagram, context, request).await?;
        let published: Created =
            http::read_json(Platform::Instagram, context, response, PlatformError::Publish).await?;
        Ok(published.id)
    }

    async fn permalink(&self, access_token: &SecretString, media_id: &str) -> Result<Option<String>> {
        let context = "permalink lookup";
        let request = self
            .client
            .get(self.graph(&format!("/{}", media_id)))
            .query(&[
                ("fields", "permalink"),
                ("access_token", access_token.expose_secret()),
            ]);
        let response = http::send(Platform::Instagram, context, request).await?;
        let link: Permalink =
            http::read_json(Platform::Instagram, context, response, PlatformError::Publish).await?;
        Ok(Some(link.permalink).filter(|p| !p.is_empty()))
    }

    /// A missing permalink never fails an already published post
    async fn permalink_or_none(&self, access_token: &SecretString, media_id: &str) -> Option<String> {
        match self.permalink(access_token, media_id).await {
            Ok(link) => link,
            Err(e) => {
                warn!(media_id, error = %e, "Could not fetch Instagram permalink");
                None
            }
        }
    }

    async fn create_carousel(
        &self,
        access_token: &SecretString,
        ig_user_id: &str,
        media_urls: &[String],
        caption: &str,
    ) -> Result<String> {
        if media_urls.len() < MIN_CAROUSEL_ITEMS || media_urls.len() > MAX_CAROUSEL_ITEMS {
            return Err(PlatformError::Validation(format!(
                "Instagram carousels need between {} and {} items, got {}",
                MIN_CAROUSEL_ITEMS,
                MAX_CAROUSEL_ITEMS,
                media_urls.len()
            ))
            .into());
        }

        let mut children = Vec::with_capacity(media_urls.len());
        for url in media_urls {
            let kind = Container::for_media(url, true);
            let id = self
                .create_media_container(access_token, ig_user_id, url, kind, None)
                .await?;
            children.push((id, kind));
        }

        // Video children transcode independently
        try_join_all(
            children
                .iter()
                .filter(|(_, kind)| kind.is_video())
                .map(|(id, kind)| self.wait_for_container(access_token, id, self.max_wait_for(*kind))),
        )
        .await?;

        let child_ids: Vec<&str> = children.iter().map(|(id, _)| id.as_str()).collect();
        let mut params = vec![
            ("media_type", "CAROUSEL".to_string()),
            ("children", child_ids.join(",")),
        ];
        if !caption.is_empty() {
            params.push(("caption", caption.to_string()));
        }
        let parent = self.create_container(access_token, ig_user_id, params).await?;

        let parent_wait = if children.iter().any(|(_, kind)| kind.is_video()) {
            self.config.video_max_wait_secs
        } else {
            self.config.photo_max_wait_secs
        };
        self.wait_for_container(access_token, &parent, parent_wait)
            .await?;

        Ok(parent)
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn required_scopes(&self) -> Vec<String> {
        self.scopes()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            publish_mode: PublishMode::Synchronous,
            requires_pre_upload: false,
            requires_pkce: false,
            supports_carousel: true,
            max_images: MAX_CAROUSEL_ITEMS,
            max_videos: MAX_CAROUSEL_ITEMS,
            allows_mixed_media: true,
        }
    }

    fn generate_auth_url(&self) -> Result<AuthUrl> {
        let state = oauth::generate_state();
        let scope = self.scopes().join(",");
        let url = oauth::build_url(
            &self.config.auth_url,
            &[
                ("client_id", self.config.app_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("response_type", "code"),
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
        let context = "code exchange";
        let request = self
            .client
            .post(endpoint(&self.config.oauth_base, "/oauth/access_token"))
            .form(&[
                ("client_id", self.config.app_id.as_str()),
                ("client_secret", self.config.app_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
            ]);
        let response = http::send(Platform::Instagram, context, request).await?;
        let short: ShortLivedToken =
            http::read_json(Platform::Instagram, context, response, PlatformError::AuthExchange)
                .await?;

        let (access, token_type, expires_in) = match self.exchange_long_lived(&short.access_token).await {
            Ok(long) => {
                let ttl = if long.expires_in > 0 {
                    long.expires_in
                } else {
                    LONG_LIVED_TTL_SECS
                };
                (long.access_token, long.token_type, ttl)
            }
            Err(e) => {
                warn!(error = %e, "Long-lived token exchange failed, keeping short-lived token");
                (short.access_token, "bearer".to_string(), SHORT_LIVED_TTL_SECS)
            }
        };

        // Instagram refreshes the access token itself
        Ok(TokenGrant {
            refresh_token: Some(SecretString::from(access.clone())),
            access_token: SecretString::from(access),
            expires_in,
            token_type,
            scope: self.scopes().join(","),
        })
    }

    async fn refresh_access_token(&self, refresh_token: &SecretString) -> Result<TokenGrant> {
        if !self.config.refresh_enabled {
            return Err(PlatformError::RefreshUnsupported(
                "token refresh is disabled for Instagram".to_string(),
            )
            .into());
        }

        let context = "token refresh";
        let request = self
            .client
            .get(self.graph("/refresh_access_token"))
            .query(&[
                ("grant_type", "ig_refresh_token"),
                ("access_token", refresh_token.expose_secret()),
            ]);
        let response = http::send(Platform::Instagram, context, request).await?;
        let token: LongLivedToken =
            http::read_json(Platform::Instagram, context, response, PlatformError::RefreshFailed)
                .await?;

        Ok(TokenGrant {
            refresh_token: Some(SecretString::from(token.access_token.clone())),
            access_token: SecretString::from(token.access_token),
            expires_in: if token.expires_in > 0 {
                token.expires_in
            } else {
                LONG_LIVED_TTL_SECS
            },
            token_type: token.token_type,
            scope: self.scopes().join(","),
        })
    }

    async fn user_info(&self, access_token: &SecretString) -> Result<UserInfo> {
        let context = "user info";
        let request = self.client.get(self.graph("/me")).query(&[
            ("fields", "id,username,name,account_type,profile_picture_url"),
            ("access_token", access_token.expose_secret()),
        ]);
        let response = http::send(Platform::Instagram, context, request).await?;
        let me: Me =
            http::read_json(Platform::Instagram, context, response, PlatformError::Authentication)
                .await?;

        let display_name = if me.name.is_empty() {
            me.username.clone()
        } else {
            me.name
        };

        Ok(UserInfo {
            platform_user_id: me.id,
            username: me.username,
            display_name,
            avatar_url: me.profile_picture_url,
        })
    }

    async fn upload_media(&self, _access_token: &SecretString, media_url: &str) -> Result<String> {
        if media_url.trim().is_empty() {
            return Err(PlatformError::Upload("media URL is required for Instagram".to_string()).into());
        }
        Ok(media_url.to_string())
    }

    async fn create_post(
        &self,
        access_token: &SecretString,
        content: &PostContent,
    ) -> Result<PublishOutcome> {
        let media_urls = if content.media_urls.is_empty() {
            vec![content.media_url.clone()]
        } else {
            content.media_urls.clone()
        };
        self.capabilities()
            .check_media(Platform::Instagram, &media_urls)?;

        let ig_user_id = self.user_info(access_token).await?.platform_user_id;

        let container_id = if media_urls.len() > 1 {
            self.create_carousel(access_token, &ig_user_id, &media_urls, &content.text)
                .await?
        } else {
            let url = &media_urls[0];
            let kind = Container::for_media(url, false);
            let id = self
                .create_media_container(access_token, &ig_user_id, url, kind, Some(&content.text))
                .await?;
            self.wait_for_container(access_token, &id, self.max_wait_for(kind))
                .await?;
            id
        };

        let media_id = self
            .publish_container(access_token, &ig_user_id, &container_id)
            .await?;
        info!(media_id = %media_id, "Instagram media published");

        let share_url = self.permalink_or_none(access_token, &media_id).await;

        Ok(PublishOutcome {
            platform_post_id: Some(media_id),
            publish_handle: None,
            status: RemoteStatus::Published,
            share_url,
        })
    }

    async fn post_status(
        &self,
        access_token: &SecretString,
        publish_handle: &str,
    ) -> Result<StatusReport> {
        // Published media only exists once the publish call has succeeded
        let share_url = self.permalink(access_token, publish_handle).await?;
        Ok(StatusReport {
            status: RemoteStatus::Published,
            platform_post_id: Some(publish_handle.to_string()),
            share_url,
            fail_reason: None,
            progress_percent: Some(100),
        })
    }
}
