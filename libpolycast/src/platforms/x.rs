//! X (Twitter) API v2 adapter
//!
//! Authorization uses OAuth 2.0 with PKCE. Media has to be uploaded through
//! the chunked v2 media endpoint before the tweet is created; the tweet
//! itself is published synchronously.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::XConfig;
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
    "tweet.read",
    "tweet.write",
    "users.read",
    "offline.access",
    "media.write",
];

/// Append segment size
const CHUNK_SIZE: usize = 512 * 1024;

/// Used when X asks us to wait without saying how long
const DEFAULT_CHECK_AFTER_SECS: u64 = 5;

pub fn share_url(tweet_id: &str) -> String {
    format!("https://twitter.com/i/web/status/{}", tweet_id)
}

/// X media category for a MIME type
pub fn media_category(mime: &str) -> &'static str {
    if mime.starts_with("video/") {
        "amplify_video"
    } else if mime == "image/gif" {
        "tweet_gif"
    } else {
        "tweet_image"
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    scope: String,
}

#[derive(Debug, Deserialize)]
struct Data<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct XUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    profile_image_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadInit {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ProcessingInfo {
    state: String,
    check_after_secs: Option<u64>,
    progress_percent: Option<u8>,
    error: Option<ProcessingError>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProcessingError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct UploadState {
    processing_info: Option<ProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
}

pub struct XAdapter {
    client: Client,
    config: XConfig,
}

impl XAdapter {
    pub fn new(config: XConfig) -> Result<Self> {
        let client = http::build_client(config.timeout_secs)?;
        Ok(Self { client, config })
    }

    fn api(&self, path: &str) -> String {
        endpoint(&self.config.api_base, path)
    }

    fn upload(&self, path: &str) -> String {
        endpoint(&self.config.upload_base, path)
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
            .post(self.api("/2/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(form);
        let response = http::send(Platform::X, context, request).await?;
        let token: TokenResponse = http::read_json(Platform::X, context, response, kind).await?;

        Ok(TokenGrant {
            access_token: SecretString::from(token.access_token),
            refresh_token: token
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            expires_in: token.expires_in,
            token_type: token.token_type,
            scope: token.scope,
        })
    }

    async fn download(&self, media_url: &str) -> Result<Vec<u8>> {
        let context = "media download";
        let response = http::send(Platform::X, context, self.client.get(media_url)).await?;
        let response =
            http::check_status(Platform::X, context, response, PlatformError::Upload).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| http::map_transport_error(Platform::X, context, e))?;

        if bytes.is_empty() {
            return Err(PlatformError::Upload(format!("media at {} is empty", media_url)).into());
        }
        Ok(bytes.to_vec())
    }

    async fn initialize(&self, access_token: &SecretString, mime: &str, total: usize) -> Result<String> {
        let context = "media upload initialize";
        let body = json!({
            "media_type": mime,
            "total_bytes": total,
            "media_category": media_category(mime),
        });
        let request = self
            .client
            .post(self.upload("/2/media/upload/initialize"))
            .bearer_auth(access_token.expose_secret())
            .json(&body);
        let response = http::send(Platform::X, context, request).await?;
        let init: Data<UploadInit> =
            http::read_json(Platform::X, context, response, PlatformError::Upload).await?;
        Ok(init.data.id)
    }

    async fn append(
        &self,
        access_token: &SecretString,
        media_id: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Result<()> {
        let context = "media upload append";
        for (index, chunk) in bytes.chunks(CHUNK_SIZE).enumerate() {
            let part = Part::bytes(chunk.to_vec())
                .file_name("media")
                .mime_str(mime)
                .map_err(|e| PlatformError::Upload(format!("invalid media type {}: {}", mime, e)))?;
            let form = Form::new()
                .part("media", part)
                .text("segment_index", index.to_string());

            let request = self
                .client
                .post(self.upload(&format!("/2/media/upload/{}/append", media_id)))
                .bearer_auth(access_token.expose_secret())
                .multipart(form);
            let response = http::send(Platform::X, context, request).await?;
            http::check_status(Platform::X, context, response, PlatformError::Upload).await?;
            debug!(media_id, segment = index, "Appended media chunk");
        }
        Ok(())
    }

    async fn finalize(&self, access_token: &SecretString, media_id: &str) -> Result<Option<ProcessingInfo>> {
        let context = "media upload finalize";
        let request = self
            .client
            .post(self.upload(&format!("/2/media/upload/{}/finalize", media_id)))
            .bearer_auth(access_token.expose_secret());
        let response = http::send(Platform::X, context, request).await?;
        let state: Data<UploadState> =
            http::read_json(Platform::X, context, response, PlatformError::Upload).await?;
        Ok(state.data.processing_info)
    }

    async fn processing_state(
        &self,
        access_token: &SecretString,
        media_id: &str,
    ) -> Result<Option<ProcessingInfo>> {
        let context = "media status";
        let request = self
            .client
            .get(self.upload("/2/media/upload"))
            .query(&[("command", "STATUS"), ("media_id", media_id)])
            .bearer_auth(access_token.expose_secret());
        let response = http::send(Platform::X, context, request).await?;
        let state: Data<UploadState> =
            http::read_json(Platform::X, context, response, PlatformError::Upload).await?;
        Ok(state.data.processing_info)
    }

    /// Wait until X finishes transcoding, honouring `check_after_secs`
    async fn wait_for_processing(
        &self,
        access_token: &SecretString,
        media_id: &str,
        mut info: Option<ProcessingInfo>,
    ) -> Result<()> {
        let max_wait = self.config.processing_max_wait_secs;
        let mut waited = 0u64;

        loop {
            let Some(current) = info else {
                return Ok(());
            };

            match current.state.as_str() {
                "succeeded" => return Ok(()),
                "failed" => {
                    let reason = current
                        .error
                        .map(|e| e.message)
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Err(PlatformError::Upload(format!(
                        "X media processing failed: {}",
                        reason
                    ))
                    .into());
                }
                _ => {}
            }

            if waited >= max_wait {
                return Err(PlatformError::Upload(format!(
                    "X media processing timeout after {} seconds",
                    max_wait
                ))
                .into());
            }

            let wait = current.check_after_secs.unwrap_or(DEFAULT_CHECK_AFTER_SECS);
            debug!(
                media_id,
                state = %current.state,
                progress = current.progress_percent.unwrap_or(0),
                wait_secs = wait,
                "X media still processing"
            );
            tokio::time::sleep(Duration::from_secs(wait)).await;
            waited += wait.max(1);

            info = self.processing_state(access_token, media_id).await?;
        }
    }
}

#[async_trait]
impl PlatformAdapter for XAdapter {
    fn platform(&self) -> Platform {
        Platform::X
    }

    fn required_scopes(&self) -> Vec<String> {
        self.scopes()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            publish_mode: PublishMode::Synchronous,
            requires_pre_upload: true,
            requires_pkce: true,
            supports_carousel: false,
            max_images: 4,
            max_videos: 1,
            allows_mixed_media: false,
        }
    }

    fn generate_auth_url(&self) -> Result<AuthUrl> {
        let state = oauth::generate_state();
        let verifier = oauth::generate_code_verifier();
        let challenge = oauth::code_challenge(&verifier);
        let scope = self.scopes().join(" ");

        let url = oauth::build_url(
            &self.config.auth_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", state.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
            ],
        )?;

        Ok(AuthUrl {
            url,
            state,
            code_verifier: Some(verifier),
        })
    }

    async fn exchange_code(&self, code: &str, extras: &AuthExtras) -> Result<TokenGrant> {
        let verifier = extras.code_verifier.as_deref().ok_or_else(|| {
            PlatformError::AuthExchange("X requires the PKCE code verifier".to_string())
        })?;

        self.token_request(
            &[
                ("code", code),
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code_verifier", verifier),
            ],
            "code exchange",
            PlatformError::AuthExchange,
        )
        .await
    }

    async fn refresh_access_token(&self, refresh_token: &SecretString) -> Result<TokenGrant> {
        self.token_request(
            &[
                ("refresh_token", refresh_token.expose_secret()),
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
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
            .get(self.api("/2/users/me"))
            .query(&[("user.fields", "profile_image_url")])
            .bearer_auth(access_token.expose_secret());
        let response = http::send(Platform::X, context, request).await?;
        let user: Data<XUser> =
            http::read_json(Platform::X, context, response, PlatformError::Authentication).await?;

        Ok(UserInfo {
            platform_user_id: user.data.id,
            username: user.data.username,
            display_name: user.data.name,
            avatar_url: user.data.profile_image_url,
        })
    }

    async fn upload_media(&self, access_token: &SecretString, media_url: &str) -> Result<String> {
        if media_url.trim().is_empty() {
            return Err(PlatformError::Upload("media URL is required for X".to_string()).into());
        }

        let bytes = self.download(media_url).await?;
        let mime = media::mime_type_of(media_url);
        debug!(bytes = bytes.len(), mime, "Uploading media to X");

        let media_id = self.initialize(access_token, mime, bytes.len()).await?;
        self.append(access_token, &media_id, mime, &bytes).await?;
        let processing = self.finalize(access_token, &media_id).await?;
        self.wait_for_processing(access_token, &media_id, processing)
            .await?;

        info!(media_id = %media_id, "X media upload complete");
        Ok(media_id)
    }

    async fn create_post(
        &self,
        access_token: &SecretString,
        content: &PostContent,
    ) -> Result<PublishOutcome> {
        if !content.media_urls.is_empty() {
            self.capabilities()
                .check_media(Platform::X, &content.media_urls)?;
        }
        if content.media_ids.is_empty() && !content.media_urls.is_empty() {
            return Err(PlatformError::Publish(
                "media must be uploaded before creating an X post".to_string(),
            )
            .into());
        }

        let mut body = json!({ "text": content.text });
        if !content.media_ids.is_empty() {
            body["media"] = json!({ "media_ids": content.media_ids });
        }

        let context = "create tweet";
        let request = self
            .client
            .post(self.api("/2/tweets"))
            .bearer_auth(access_token.expose_secret())
            .json(&body);
        let response = http::send(Platform::X, context, request).await?;
        let tweet: Data<Tweet> =
            http::read_json(Platform::X, context, response, PlatformError::Publish).await?;

        info!(tweet_id = %tweet.data.id, media = content.media_ids.len(), "Tweet created");

        Ok(PublishOutcome {
            share_url: Some(share_url(&tweet.data.id)),
            platform_post_id: Some(tweet.data.id),
            publish_handle: None,
            status: RemoteStatus::Published,
        })
    }

    async fn post_status(
        &self,
        _access_token: &SecretString,
        publish_handle: &str,
    ) -> Result<StatusReport> {
        // Tweets are live as soon as they are created
        Ok(StatusReport {
            status: RemoteStatus::Published,
            platform_post_id: Some(publish_handle.to_string()),
            share_url: Some(share_url(publish_handle)),
            fail_reason: None,
            progress_percent: Some(100),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> XConfig {
        XConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "https://example.com/cb/x".to_string(),
            scopes: None,
            timeout_secs: 5,
            api_base: base.to_string(),
            upload_base: base.to_string(),
            auth_url: "https://twitter.com/i/oauth2/authorize".to_string(),
            processing_max_wait_secs: 10,
        }
    }

    fn token() -> SecretString {
        SecretString::from("access".to_string())
    }

    #[test]
    fn test_media_category() {
        assert_eq!(media_category("video/mp4"), "amplify_video");
        assert_eq!(media_category("image/gif"), "tweet_gif");
        assert_eq!(media_category("image/png"), "tweet_image");
    }

    #[test]
    fn test_auth_url_uses_pkce() {
        let adapter = XAdapter::new(config("http://127.0.0.1:1")).unwrap();
        let auth = adapter.generate_auth_url().unwrap();

        let verifier = auth.code_verifier.expect("X must return a verifier");
        assert_eq!(verifier.len(), 43);
        assert!(auth.url.contains("code_challenge_method=S256"));
        assert!(auth
            .url
            .contains(&format!("code_challenge={}", oauth::code_challenge(&verifier))));
        assert!(auth.url.contains("scope=tweet.read+tweet.write+users.read+offline.access+media.write"));
        assert!(auth.url.contains(&format!("state={}", auth.state)));
    }

    #[tokio::test]
    async fn test_exchange_requires_verifier() {
        let adapter = XAdapter::new(config("http://127.0.0.1:1")).unwrap();
        let err = adapter
            .exchange_code("code", &AuthExtras::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::PolycastError::Platform(PlatformError::AuthExchange(_))
        ));
    }

    #[tokio::test]
    async fn test_exchange_code_sends_verifier_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("code_verifier=the-verifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "expires_in": 7200,
                "token_type": "bearer",
                "scope": "tweet.read tweet.write"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = XAdapter::new(config(&server.uri())).unwrap();
        let grant = adapter
            .exchange_code(
                "code",
                &AuthExtras {
                    code_verifier: Some("the-verifier".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(grant.access_token.expose_secret(), "new-access");
        assert_eq!(
            grant.refresh_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("new-refresh".to_string())
        );
        assert_eq!(grant.expires_in, 7200);
    }

    #[tokio::test]
    async fn test_refresh_rejection_is_refresh_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let adapter = XAdapter::new(config(&server.uri())).unwrap();
        let err = adapter
            .refresh_access_token(&SecretString::from("old".to_string()))
            .await
            .unwrap_err();

        match err {
            crate::error::PolycastError::Platform(PlatformError::RefreshFailed(msg)) => {
                assert!(msg.contains("invalid_grant"));
            }
            other => panic!("Expected RefreshFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_user_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/2/users/me"))
            .and(query_param("user.fields", "profile_image_url"))
            .and(header("authorization", "Bearer access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "id": "42",
                    "name": "Polly Cast",
                    "username": "polly",
                    "profile_image_url": "https://pbs/avatar.jpg"
                }
            })))
            .mount(&server)
            .await;

        let adapter = XAdapter::new(config(&server.uri())).unwrap();
        let user = adapter.user_info(&token()).await.unwrap();
        assert_eq!(user.platform_user_id, "42");
        assert_eq!(user.username, "polly");
        assert_eq!(user.display_name, "Polly Cast");
    }

    #[tokio::test]
    async fn test_chunked_upload_of_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/photo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1024]))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/media/upload/initialize"))
            .and(body_string_contains("tweet_image"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "m-1"}})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/media/upload/m-1/append"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/media/upload/m-1/finalize"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "m-1"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let adapter = XAdapter::new(config(&server.uri())).unwrap();
        let media_id = adapter
            .upload_media(&token(), &format!("{}/media/photo.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(media_id, "m-1");
    }

    #[tokio::test]
    async fn test_video_upload_waits_for_processing() {
        let server = MockServer::start().await;
        // Two and a half chunks worth of bytes
        Mock::given(method("GET"))
            .and(path("/media/clip.mp4"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(vec![1u8; CHUNK_SIZE * 2 + CHUNK_SIZE / 2]),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/media/upload/initialize"))
            .and(body_string_contains("amplify_video"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "v-1"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/media/upload/v-1/append"))
            .respond_with(ResponseTemplate::new(204))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/media/upload/v-1/finalize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "id": "v-1",
                    "processing_info": {"state": "pending", "check_after_secs": 1}
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/2/media/upload"))
            .and(query_param("command", "STATUS"))
            .and(query_param("media_id", "v-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "id": "v-1",
                    "processing_info": {"state": "succeeded", "progress_percent": 100}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = XAdapter::new(config(&server.uri())).unwrap();
        let media_id = adapter
            .upload_media(&token(), &format!("{}/media/clip.mp4", server.uri()))
            .await
            .unwrap();
        assert_eq!(media_id, "v-1");
    }

    #[tokio::test]
    async fn test_processing_failure_is_upload_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 16]))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/media/upload/initialize"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "v-2"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/media/upload/v-2/append"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/media/upload/v-2/finalize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "id": "v-2",
                    "processing_info": {"state": "failed", "error": {"message": "InvalidMedia"}}
                }
            })))
            .mount(&server)
            .await;

        let adapter = XAdapter::new(config(&server.uri())).unwrap();
        let err = adapter
            .upload_media(&token(), &format!("{}/media/clip.mp4", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("InvalidMedia"));
    }

    #[tokio::test]
    async fn test_create_tweet_with_media() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .and(body_string_contains("\"media_ids\":[\"m-1\",\"m-2\"]"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": {"id": "1790000000000000000", "text": "hello"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = XAdapter::new(config(&server.uri())).unwrap();
        let content = PostContent {
            text: "hello".to_string(),
            media_url: "https://cdn/a.jpg".to_string(),
            media_urls: vec!["https://cdn/a.jpg".to_string(), "https://cdn/b.jpg".to_string()],
            media_ids: vec!["m-1".to_string(), "m-2".to_string()],
            settings: None,
        };

        let outcome = adapter.create_post(&token(), &content).await.unwrap();
        assert_eq!(outcome.status, RemoteStatus::Published);
        assert_eq!(outcome.platform_post_id.as_deref(), Some("1790000000000000000"));
        assert_eq!(
            outcome.share_url.as_deref(),
            Some("https://twitter.com/i/web/status/1790000000000000000")
        );
    }

    #[tokio::test]
    async fn test_create_tweet_rejects_mixed_media_locally() {
        let adapter = XAdapter::new(config("http://127.0.0.1:1")).unwrap();
        let content = PostContent {
            text: "hello".to_string(),
            media_url: "https://cdn/a.jpg".to_string(),
            media_urls: vec!["https://cdn/a.jpg".to_string(), "https://cdn/b.mp4".to_string()],
            media_ids: vec!["m-1".to_string(), "m-2".to_string()],
            settings: None,
        };

        let err = adapter.create_post(&token(), &content).await.unwrap_err();
        assert!(err.to_string().contains("mixing"));
    }

    #[tokio::test]
    async fn test_unauthorized_tweet_maps_to_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let adapter = XAdapter::new(config(&server.uri())).unwrap();
        let mut content = PostContent::single("hello", "https://cdn/a.mp4");
        content.media_ids = vec!["m-1".to_string()];

        let err = adapter.create_post(&token(), &content).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
