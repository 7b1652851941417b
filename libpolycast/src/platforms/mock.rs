//! Mock platform adapter for testing
//!
//! `MockAdapter` simulates a platform without network access. It can be
//! shaped as a synchronous or polled platform, made to fail at any step, and
//! scripted with a sequence of status reports. Every call is recorded in a
//! shared [`MockCalls`] handle so tests can inspect what the orchestrator did
//! after the adapter has been moved into a registry.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::types::Platform;

use super::{
    AuthExtras, AuthUrl, Capabilities, PlatformAdapter, PostContent, PublishMode,
    PublishOutcome, RemoteStatus, StatusReport, TokenGrant, UserInfo,
};

/// Scripted answer for one `post_status` call
pub type ScriptedStatus = std::result::Result<StatusReport, PlatformError>;

/// Status report for a completed publish
pub fn published_report(platform_post_id: &str) -> StatusReport {
    StatusReport {
        status: RemoteStatus::Published,
        platform_post_id: Some(platform_post_id.to_string()),
        share_url: Some(format!("https://example.com/posts/{}", platform_post_id)),
        fail_reason: None,
        progress_percent: Some(100),
    }
}

/// Status report for a publish the platform rejected
pub fn failed_report(reason: Option<&str>) -> StatusReport {
    StatusReport {
        status: RemoteStatus::Failed,
        platform_post_id: None,
        share_url: None,
        fail_reason: reason.map(|r| r.to_string()),
        progress_percent: None,
    }
}

/// Everything the adapter has been asked to do
#[derive(Debug, Clone, Default)]
pub struct MockCalls {
    exchanges: Arc<Mutex<usize>>,
    refreshes: Arc<Mutex<usize>>,
    uploads: Arc<Mutex<Vec<String>>>,
    posts: Arc<Mutex<Vec<PostContent>>>,
    status_checks: Arc<Mutex<usize>>,
    tokens_used: Arc<Mutex<Vec<String>>>,
}

fn bump(counter: &Mutex<usize>) {
    *counter.lock().unwrap_or_else(|e| e.into_inner()) += 1;
}

fn read<T: Clone>(value: &Mutex<T>) -> T {
    value.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

impl MockCalls {
    pub fn exchanges(&self) -> usize {
        read(&self.exchanges)
    }

    pub fn refreshes(&self) -> usize {
        read(&self.refreshes)
    }

    /// Media URLs passed to `upload_media`, in call order
    pub fn uploads(&self) -> Vec<String> {
        read(&self.uploads)
    }

    /// Content passed to `create_post`, in call order
    pub fn posts(&self) -> Vec<PostContent> {
        read(&self.posts)
    }

    pub fn status_checks(&self) -> usize {
        read(&self.status_checks)
    }

    /// Access tokens presented to `create_post`
    pub fn tokens_used(&self) -> Vec<String> {
        read(&self.tokens_used)
    }
}

/// Configurable fake platform
pub struct MockAdapter {
    platform: Platform,
    scopes: Vec<String>,
    capabilities: Capabilities,
    delay: Duration,
    user: UserInfo,
    exchange_error: Option<PlatformError>,
    refresh_error: Option<PlatformError>,
    upload_error: Option<PlatformError>,
    publish_error: Option<PlatformError>,
    publish_outcome: Option<PublishOutcome>,
    inbox: bool,
    refresh_expires_in: i64,
    rotate_refresh_token: bool,
    status_script: Mutex<VecDeque<ScriptedStatus>>,
    fallback_status: RemoteStatus,
    calls: MockCalls,
}

impl MockAdapter {
    fn new(platform: Platform, publish_mode: PublishMode) -> Self {
        Self {
            platform,
            scopes: vec!["mock.publish".to_string()],
            capabilities: Capabilities {
                publish_mode,
                requires_pre_upload: false,
                requires_pkce: false,
                supports_carousel: true,
                max_images: 10,
                max_videos: 10,
                allows_mixed_media: true,
            },
            delay: Duration::ZERO,
            user: UserInfo {
                platform_user_id: format!("{}-user", platform),
                username: format!("{}_tester", platform),
                display_name: "Mock Tester".to_string(),
                avatar_url: String::new(),
            },
            exchange_error: None,
            refresh_error: None,
            upload_error: None,
            publish_error: None,
            publish_outcome: None,
            inbox: false,
            refresh_expires_in: 3600,
            rotate_refresh_token: true,
            status_script: Mutex::new(VecDeque::new()),
            fallback_status: RemoteStatus::Processing,
            calls: MockCalls::default(),
        }
    }

    /// A platform whose `create_post` publishes immediately
    pub fn synchronous(platform: Platform) -> Self {
        Self::new(platform, PublishMode::Synchronous)
    }

    /// A platform whose `create_post` returns a handle to poll
    pub fn polled(platform: Platform) -> Self {
        Self::new(platform, PublishMode::Polled)
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Require `upload_media` before `create_post`
    pub fn with_pre_upload(mut self) -> Self {
        self.capabilities.requires_pre_upload = true;
        self
    }

    /// Simulated latency for `create_post`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = user;
        self
    }

    pub fn failing_exchange(mut self, message: &str) -> Self {
        self.exchange_error = Some(PlatformError::AuthExchange(message.to_string()));
        self
    }

    pub fn failing_refresh(mut self, error: PlatformError) -> Self {
        self.refresh_error = Some(error);
        self
    }

    pub fn failing_upload(mut self, message: &str) -> Self {
        self.upload_error = Some(PlatformError::Upload(message.to_string()));
        self
    }

    pub fn failing_publish(mut self, message: &str) -> Self {
        self.publish_error = Some(PlatformError::Publish(message.to_string()));
        self
    }

    /// `create_post` answers with `outcome` verbatim
    pub fn returning_outcome(mut self, outcome: PublishOutcome) -> Self {
        self.publish_outcome = Some(outcome);
        self
    }

    /// `create_post` reports the upload as delivered to the creator inbox
    pub fn sending_to_inbox(mut self) -> Self {
        self.inbox = true;
        self
    }

    /// Grant returned by `refresh_access_token`
    pub fn with_refresh_grant(mut self, expires_in: i64, rotate_refresh_token: bool) -> Self {
        self.refresh_expires_in = expires_in;
        self.rotate_refresh_token = rotate_refresh_token;
        self
    }

    /// Answers for successive `post_status` calls
    pub fn with_status_script(self, script: Vec<ScriptedStatus>) -> Self {
        *self.status_script.lock().unwrap_or_else(|e| e.into_inner()) = script.into();
        self
    }

    /// Status reported once the script runs out
    pub fn with_fallback_status(mut self, status: RemoteStatus) -> Self {
        self.fallback_status = status;
        self
    }

    pub fn calls(&self) -> MockCalls {
        self.calls.clone()
    }

    fn grant(&self, prefix: &str, n: usize) -> TokenGrant {
        TokenGrant {
            access_token: SecretString::from(format!("{}-access-{}", prefix, n)),
            refresh_token: self
                .rotate_refresh_token
                .then(|| SecretString::from(format!("{}-refresh-{}", prefix, n))),
            expires_in: self.refresh_expires_in,
            token_type: "bearer".to_string(),
            scope: self.scopes.join(" "),
        }
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn required_scopes(&self) -> Vec<String> {
        self.scopes.clone()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn generate_auth_url(&self) -> Result<AuthUrl> {
        let state = super::oauth::generate_state();
        let code_verifier = self
            .capabilities
            .requires_pkce
            .then(super::oauth::generate_code_verifier);
        Ok(AuthUrl {
            url: format!("https://auth.example.com/{}?state={}", self.platform, state),
            state,
            code_verifier,
        })
    }

    async fn exchange_code(&self, _code: &str, extras: &AuthExtras) -> Result<TokenGrant> {
        bump(&self.calls.exchanges);
        if let Some(error) = &self.exchange_error {
            return Err(error.clone().into());
        }
        if self.capabilities.requires_pkce && extras.code_verifier.is_none() {
            return Err(PlatformError::AuthExchange("missing code verifier".to_string()).into());
        }
        Ok(self.grant("exchanged", self.calls.exchanges()))
    }

    async fn refresh_access_token(&self, _refresh_token: &SecretString) -> Result<TokenGrant> {
        bump(&self.calls.refreshes);
        if let Some(error) = &self.refresh_error {
            return Err(error.clone().into());
        }
        Ok(self.grant("refreshed", self.calls.refreshes()))
    }

    async fn user_info(&self, _access_token: &SecretString) -> Result<UserInfo> {
        Ok(self.user.clone())
    }

    async fn upload_media(&self, _access_token: &SecretString, media_url: &str) -> Result<String> {
        self.calls
            .uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(media_url.to_string());
        if let Some(error) = &self.upload_error {
            return Err(error.clone().into());
        }
        Ok(format!("media-{}", self.calls.uploads().len()))
    }

    async fn create_post(
        &self,
        access_token: &SecretString,
        content: &PostContent,
    ) -> Result<PublishOutcome> {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let n = {
            let mut posts = self.calls.posts.lock().unwrap_or_else(|e| e.into_inner());
            posts.push(content.clone());
            posts.len()
        };
        self.calls
            .tokens_used
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(access_token.expose_secret().to_string());

        if let Some(error) = &self.publish_error {
            return Err(error.clone().into());
        }

        if let Some(outcome) = &self.publish_outcome {
            return Ok(outcome.clone());
        }

        if self.inbox {
            return Ok(PublishOutcome {
                platform_post_id: None,
                publish_handle: Some(format!("inbox-{}", n)),
                status: RemoteStatus::SentToInbox,
                share_url: None,
            });
        }

        match self.capabilities.publish_mode {
            PublishMode::Synchronous => {
                let id = format!("{}-post-{}", self.platform, n);
                Ok(PublishOutcome {
                    share_url: Some(format!("https://example.com/{}/{}", self.platform, id)),
                    platform_post_id: Some(id),
                    publish_handle: None,
                    status: RemoteStatus::Published,
                })
            }
            PublishMode::Polled => Ok(PublishOutcome {
                platform_post_id: None,
                publish_handle: Some(format!("publish-{}", n)),
                status: RemoteStatus::Processing,
                share_url: None,
            }),
        }
    }

    async fn post_status(
        &self,
        _access_token: &SecretString,
        publish_handle: &str,
    ) -> Result<StatusReport> {
        bump(&self.calls.status_checks);

        let next = self
            .status_script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match next {
            Some(Ok(report)) => Ok(report),
            Some(Err(error)) => Err(error.into()),
            None => match self.fallback_status {
                RemoteStatus::Published => Ok(published_report(publish_handle)),
                RemoteStatus::Failed => Ok(failed_report(None)),
                status => Ok(StatusReport {
                    status,
                    ..StatusReport::processing()
                }),
            },
        }
    }
}
