//! Per-platform publish job
//!
//! A job takes one post record from `pending` to a terminal state:
//!
//! 1. mark the record `processing` and re-read it; a record that is already
//!    terminal is left alone
//! 2. resolve the adapter and a fresh access token
//! 3. upload media first if the platform needs it
//! 4. create the post, then either finish immediately or poll the platform
//!    until it reports an outcome
//!
//! Every failure lands on the record and in the request's error map. A job
//! never returns an error to its caller.

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::PublishingConfig;
use crate::dispatch::{ErrorMap, Job, JobHandler};
use crate::platforms::{PlatformAdapter, PostContent, PublishMode, PublishOutcome, RemoteStatus};
use crate::registry::PlatformRegistry;
use crate::store::{ConnectionStore, PostStore};
use crate::tokens::TokenManager;
use crate::types::{Post, PostStatus};

use super::events::{Event, EventBus};

pub const MSG_POST_UNAVAILABLE: &str = "could not retrieve post details";
pub const MSG_PLATFORM_UNAVAILABLE: &str = "platform not available";
pub const MSG_TIMEOUT: &str = "publishing timeout";
pub const MSG_UNKNOWN: &str = "unknown error";

/// How a job ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Published {
        platform_post_id: String,
        share_url: Option<String>,
    },
    SentToInbox {
        publish_handle: String,
    },
    Failed(String),
    /// Another job already finished this record
    AlreadyTerminal(PostStatus),
}

#[derive(Clone)]
pub struct PublishWorker {
    posts: Arc<dyn PostStore>,
    connections: Arc<dyn ConnectionStore>,
    registry: PlatformRegistry,
    tokens: TokenManager,
    events: EventBus,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl PublishWorker {
    pub fn new(
        posts: Arc<dyn PostStore>,
        connections: Arc<dyn ConnectionStore>,
        registry: PlatformRegistry,
        tokens: TokenManager,
        events: EventBus,
        publishing: &PublishingConfig,
    ) -> Self {
        Self {
            posts,
            connections,
            registry,
            tokens,
            events,
            poll_interval: publishing.poll_interval(),
            max_poll_attempts: publishing.max_poll_attempts.max(1),
        }
    }

    fn emit_status(&self, job: &Job, status: PostStatus, detail: Option<String>) {
        self.events.emit(Event::StatusChanged {
            post_id: job.post_id.clone(),
            platform: job.platform,
            status,
            detail,
        });
    }

    async fn process(&self, job: &Job) -> Outcome {
        match self
            .posts
            .update_status(&job.post_id, PostStatus::Processing, None)
            .await
        {
            Ok(true) => self.emit_status(job, PostStatus::Processing, None),
            Ok(false) => debug!(post_id = %job.post_id, "Post could not be claimed"),
            Err(e) => warn!(post_id = %job.post_id, error = %e, "Could not mark post as processing"),
        }

        let post = match self.posts.get_post(&job.post_id).await {
            Ok(Some(post)) if post.status.is_terminal() => {
                return Outcome::AlreadyTerminal(post.status)
            }
            Ok(Some(post)) => post,
            Ok(None) => return Outcome::Failed(MSG_POST_UNAVAILABLE.to_string()),
            Err(e) => {
                warn!(post_id = %job.post_id, error = %e, "Could not load post");
                return Outcome::Failed(MSG_POST_UNAVAILABLE.to_string());
            }
        };

        let Some(adapter) = self.registry.get(job.platform) else {
            return Outcome::Failed(MSG_PLATFORM_UNAVAILABLE.to_string());
        };

        let access_token = match self.tokens.access_token(adapter.as_ref(), job.user_id).await {
            Ok(token) => token,
            Err(e) => return Outcome::Failed(e.detail()),
        };

        let mut content = PostContent {
            text: post.caption.clone(),
            media_url: post.media_url.clone(),
            media_urls: post.all_media_urls(),
            media_ids: Vec::new(),
            settings: post.settings.clone(),
        };

        let capabilities = adapter.capabilities();
        if capabilities.requires_pre_upload {
            if let Err(e) = capabilities.check_media(job.platform, &content.media_urls) {
                return Outcome::Failed(e.to_string());
            }
            for (index, url) in content.media_urls.iter().enumerate() {
                self.emit_status(
                    job,
                    PostStatus::Processing,
                    Some(format!("uploading media {}/{}", index + 1, content.media_urls.len())),
                );
                match adapter.upload_media(&access_token, url).await {
                    Ok(media_id) => content.media_ids.push(media_id),
                    Err(e) => return Outcome::Failed(e.detail()),
                }
            }
        }

        let outcome = match adapter.create_post(&access_token, &content).await {
            Ok(outcome) => outcome,
            Err(e) => return Outcome::Failed(e.detail()),
        };

        if let Err(e) = self
            .connections
            .touch_connection(job.user_id, job.platform)
            .await
        {
            warn!(user_id = job.user_id, platform = %job.platform, error = %e, "Could not update connection usage");
        }

        self.settle(job, &post, adapter.as_ref(), &access_token, outcome)
            .await
    }

    /// Turn the response to `create_post` into an outcome, polling when the
    /// platform is still working on it
    async fn settle(
        &self,
        job: &Job,
        post: &Post,
        adapter: &dyn PlatformAdapter,
        access_token: &SecretString,
        outcome: PublishOutcome,
    ) -> Outcome {
        let name = job.platform.display_name();
        let publish_handle = outcome.publish_handle.filter(|h| !h.is_empty());
        let platform_post_id = outcome.platform_post_id.filter(|id| !id.is_empty());

        match outcome.status {
            RemoteStatus::Published => match platform_post_id.or(publish_handle) {
                Some(platform_post_id) => Outcome::Published {
                    platform_post_id,
                    share_url: outcome.share_url,
                },
                None => Outcome::Failed(format!(
                    "{} reported the post as published but returned no post ID",
                    name
                )),
            },
            RemoteStatus::SentToInbox => match publish_handle.or(platform_post_id) {
                Some(publish_handle) => Outcome::SentToInbox { publish_handle },
                None => Outcome::Failed(format!(
                    "{} sent the post to the inbox but returned no publish handle",
                    name
                )),
            },
            RemoteStatus::Failed => Outcome::Failed(MSG_UNKNOWN.to_string()),
            RemoteStatus::Processing if adapter.capabilities().publish_mode == PublishMode::Synchronous => {
                Outcome::Failed(format!(
                    "{} publishes synchronously but reported the post as still processing",
                    name
                ))
            }
            RemoteStatus::Processing => match publish_handle {
                Some(handle) => {
                    self.emit_status(job, PostStatus::Processing, Some("waiting for platform".to_string()));
                    self.poll(job, post, adapter, access_token, &handle).await
                }
                None => Outcome::Failed(format!(
                    "{} accepted the post but returned no publish handle",
                    name
                )),
            },
        }
    }

    /// Ask the platform for the outcome until it reports one or the attempt
    /// budget runs out
    async fn poll(
        &self,
        job: &Job,
        post: &Post,
        adapter: &dyn PlatformAdapter,
        access_token: &SecretString,
        handle: &str,
    ) -> Outcome {
        for attempt in 1..=self.max_poll_attempts {
            sleep(self.poll_interval).await;

            let report = match adapter.post_status(access_token, handle).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(post_id = %post.id, attempt, error = %e, "Status check failed");
                    continue;
                }
            };

            match report.status {
                RemoteStatus::Published => {
                    return Outcome::Published {
                        platform_post_id: report
                            .platform_post_id
                            .filter(|id| !id.is_empty())
                            .unwrap_or_else(|| handle.to_string()),
                        share_url: report.share_url,
                    }
                }
                RemoteStatus::SentToInbox => {
                    return Outcome::SentToInbox {
                        publish_handle: handle.to_string(),
                    }
                }
                RemoteStatus::Failed => {
                    return Outcome::Failed(
                        report
                            .fail_reason
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| MSG_UNKNOWN.to_string()),
                    )
                }
                RemoteStatus::Processing => {
                    debug!(post_id = %post.id, attempt, progress = ?report.progress_percent, "Still processing");
                    if let Some(progress) = report.progress_percent {
                        self.emit_status(
                            job,
                            PostStatus::Processing,
                            Some(format!("{}% processed", progress)),
                        );
                    }
                }
            }
        }

        Outcome::Failed(MSG_TIMEOUT.to_string())
    }

    /// Persist the outcome and report it
    async fn finish(&self, job: &Job, outcome: Outcome) {
        if let Outcome::AlreadyTerminal(status) = outcome {
            info!(post_id = %job.post_id, platform = %job.platform, %status, "Post already finished, job skipped");
            return;
        }

        let (status, platform_post_id, share_url, error_message) = match &outcome {
            Outcome::Published {
                platform_post_id,
                share_url,
            } => (
                PostStatus::Published,
                Some(platform_post_id.clone()),
                share_url.clone(),
                None,
            ),
            Outcome::SentToInbox { publish_handle } => (
                PostStatus::SentToInbox,
                Some(publish_handle.clone()),
                None,
                None,
            ),
            Outcome::Failed(message) => (PostStatus::Failed, None, None, Some(message.clone())),
            Outcome::AlreadyTerminal(status) => (*status, None, None, None),
        };

        let stored = match &outcome {
            Outcome::Published {
                platform_post_id,
                share_url,
            } => {
                self.posts
                    .mark_published(&job.post_id, platform_post_id, share_url.as_deref())
                    .await
            }
            Outcome::SentToInbox { publish_handle } => {
                self.posts
                    .mark_sent_to_inbox(&job.post_id, publish_handle)
                    .await
            }
            Outcome::Failed(message) => {
                self.posts
                    .update_status(&job.post_id, PostStatus::Failed, Some(message.as_str()))
                    .await
            }
            Outcome::AlreadyTerminal(_) => Ok(false),
        };

        match stored {
            Ok(true) => {}
            Ok(false) => warn!(post_id = %job.post_id, %status, "Post already terminal, outcome not stored"),
            Err(e) => error!(post_id = %job.post_id, %status, error = %e, "Could not store publish outcome"),
        }

        if let Some(message) = &error_message {
            record_error(&job.errors, job, message);
            warn!(post_id = %job.post_id, platform = %job.platform, error = %message, "Publish failed");
        } else {
            info!(post_id = %job.post_id, platform = %job.platform, %status, "Publish finished");
        }

        self.events.emit(Event::JobFinished {
            post_id: job.post_id.clone(),
            platform: job.platform,
            status,
            platform_post_id,
            share_url,
            error: error_message,
        });
    }
}

fn record_error(errors: &ErrorMap, job: &Job, message: &str) {
    errors
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(job.platform, message.to_string());
}

#[async_trait]
impl JobHandler for PublishWorker {
    async fn run(&self, job: Job) {
        debug!(post_id = %job.post_id, platform = %job.platform, user_id = job.user_id, "Publish job started");
        let outcome = self.process(&job).await;
        self.finish(&job, outcome).await;
    }
}
