//! Publishing service: the request side of the orchestrator
//!
//! `create_post` validates a multi-platform request, writes one `pending`
//! record per platform and hands each record to the job queue. It returns as
//! soon as the jobs are queued; outcomes are read back later through
//! `get_post_status` / `get_user_posts` or followed on the event bus.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::dispatch::{ErrorMap, Job, JobQueue};
use crate::error::{PolycastError, Result};
use crate::media;
use crate::store::{ConnectionStore, PostStore};
use crate::types::{Platform, PlatformSettings, Post, PostStatus};

use super::events::{Event, EventBus};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Request to publish the same media to several platforms
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub user_id: i64,
    /// Platform identifiers as given by the caller, e.g. `"tiktok"`
    pub platforms: Vec<String>,
    /// Primary media first
    pub media_urls: Vec<String>,
    pub caption: String,
    pub settings: Option<PlatformSettings>,
}

/// Records created for a request
#[derive(Debug, Clone)]
pub struct PublishResponse {
    /// One `pending` record per accepted platform, in request order
    pub posts: Vec<Post>,
    /// Platforms whose record could not be created or queued
    pub creation_errors: HashMap<Platform, String>,
    /// Live error map that jobs write to as they fail
    pub errors: ErrorMap,
}

impl PublishResponse {
    /// Creation errors plus every job failure reported so far
    pub fn errors_snapshot(&self) -> HashMap<Platform, String> {
        let mut all = self.creation_errors.clone();
        let jobs = self.errors.lock().unwrap_or_else(|e| e.into_inner());
        for (platform, message) in jobs.iter() {
            all.entry(*platform).or_insert_with(|| message.clone());
        }
        all
    }

    pub fn post_ids(&self) -> Vec<String> {
        self.posts.iter().map(|p| p.id.clone()).collect()
    }
}

/// Parse and deduplicate platform identifiers, keeping first occurrences
pub fn parse_platforms(raw: &[String]) -> Result<Vec<Platform>> {
    let mut seen = HashSet::new();
    let mut platforms = Vec::new();
    for name in raw.iter().flat_map(|s| s.split(',')) {
        if name.trim().is_empty() {
            continue;
        }
        let platform: Platform = name.parse()?;
        if seen.insert(platform) {
            platforms.push(platform);
        }
    }
    Ok(platforms)
}

/// Clamp a caller supplied page size: 0 means the default
pub fn page_size(limit: u32) -> u32 {
    match limit {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    }
}

#[derive(Clone)]
pub struct PublishingService {
    posts: Arc<dyn PostStore>,
    connections: Arc<dyn ConnectionStore>,
    queue: Arc<dyn JobQueue>,
    events: EventBus,
}

impl PublishingService {
    pub fn new(
        posts: Arc<dyn PostStore>,
        connections: Arc<dyn ConnectionStore>,
        queue: Arc<dyn JobQueue>,
        events: EventBus,
    ) -> Self {
        Self {
            posts,
            connections,
            queue,
            events,
        }
    }

    /// Accept a publish request.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` when no platform or no media URL is given, or a
    ///   platform name is unknown
    /// - `NotConnected` when any requested platform is not an active
    ///   connection of the user; nothing is created in that case
    ///
    /// Failures creating an individual record do not fail the request; they
    /// are reported in `PublishResponse::creation_errors`.
    pub async fn create_post(&self, request: PublishRequest) -> Result<PublishResponse> {
        let platforms = parse_platforms(&request.platforms)?;
        if platforms.is_empty() {
            return Err(PolycastError::InvalidInput(
                "at least one platform is required".to_string(),
            ));
        }

        let media_urls: Vec<String> = request
            .media_urls
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        if media_urls.is_empty() {
            return Err(PolycastError::InvalidInput(
                "at least one media URL is required".to_string(),
            ));
        }

        self.ensure_connected(request.user_id, &platforms).await?;

        let media_kind = media::classify(&media_urls);
        let settings = request.settings.filter(|s| !s.is_empty());
        let errors = ErrorMap::default();
        let mut creation_errors = HashMap::new();
        let mut posts = Vec::with_capacity(platforms.len());

        for platform in platforms {
            let post = Post::new(
                request.user_id,
                platform,
                &media_urls,
                request.caption.clone(),
                media_kind,
                settings.clone(),
            );

            if let Err(e) = self.posts.create_post(&post).await {
                warn!(%platform, error = %e, "Could not create post record");
                creation_errors.insert(platform, e.detail());
                continue;
            }

            match self.submit(&post, errors.clone()).await {
                Ok(()) => posts.push(post),
                Err(message) => {
                    creation_errors.insert(platform, message);
                }
            }
        }

        info!(
            user_id = request.user_id,
            queued = posts.len(),
            failed = creation_errors.len(),
            kind = %media_kind,
            "Publish request accepted"
        );

        Ok(PublishResponse {
            posts,
            creation_errors,
            errors,
        })
    }

    /// Queue a job for a freshly written record. A record whose job cannot be
    /// queued is failed on the spot.
    async fn submit(&self, post: &Post, errors: ErrorMap) -> std::result::Result<(), String> {
        let job = Job {
            post_id: post.id.clone(),
            user_id: post.user_id,
            platform: post.platform,
            errors,
        };

        match self.queue.submit(job) {
            Ok(()) => {
                self.events.emit(Event::JobQueued {
                    post_id: post.id.clone(),
                    platform: post.platform,
                });
                Ok(())
            }
            Err(e) => {
                let message = e.detail();
                warn!(post_id = %post.id, error = %message, "Could not queue publish job");
                if let Err(e) = self
                    .posts
                    .update_status(&post.id, PostStatus::Failed, Some(&message))
                    .await
                {
                    warn!(post_id = %post.id, error = %e, "Could not mark unqueued post as failed");
                }
                Err(message)
            }
        }
    }

    async fn ensure_connected(&self, user_id: i64, platforms: &[Platform]) -> Result<()> {
        let active: HashSet<Platform> = self
            .connections
            .connected_platforms(user_id)
            .await?
            .into_iter()
            .filter(|c| c.is_active)
            .map(|c| c.platform)
            .collect();

        let missing: Vec<String> = platforms
            .iter()
            .filter(|p| !active.contains(p))
            .map(|p| p.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            debug!(user_id, ?missing, "Rejecting request for unconnected platforms");
            Err(PolycastError::NotConnected(missing))
        }
    }

    /// Current state of one of the user's posts.
    ///
    /// # Errors
    ///
    /// `NotFound` when the post does not exist or belongs to another user.
    pub async fn get_post_status(&self, post_id: &str, user_id: i64) -> Result<Post> {
        match self.posts.get_post(post_id).await? {
            Some(post) if post.user_id == user_id => Ok(post),
            _ => Err(PolycastError::NotFound(format!("post {}", post_id))),
        }
    }

    /// Newest first. `limit` 0 means the default page size; larger values
    /// are capped.
    pub async fn get_user_posts(
        &self,
        user_id: i64,
        platform: Option<Platform>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Post>> {
        self.posts
            .list_user_posts(user_id, platform, page_size(limit), offset)
            .await
    }

    /// Run a failed post again with a fresh job.
    ///
    /// # Errors
    ///
    /// - `NotFound` as for [`Self::get_post_status`]
    /// - `InvalidInput` if the post is not `failed`
    /// - `NotConnected` if the user has since disconnected the platform
    pub async fn reprocess_post(&self, post_id: &str, user_id: i64) -> Result<PublishResponse> {
        let post = self.get_post_status(post_id, user_id).await?;
        if post.status != PostStatus::Failed {
            return Err(PolycastError::InvalidInput(format!(
                "only failed posts can be reprocessed (post {} is {})",
                post.id, post.status
            )));
        }

        self.ensure_connected(user_id, &[post.platform]).await?;

        if !self.posts.reset_for_reprocess(&post.id).await? {
            return Err(PolycastError::InvalidInput(format!(
                "post {} changed state and was not reprocessed",
                post.id
            )));
        }
        info!(post_id = %post.id, platform = %post.platform, "Reprocessing post");

        let post = self.get_post_status(post_id, user_id).await?;
        let errors = ErrorMap::default();
        let mut creation_errors = HashMap::new();
        let mut posts = Vec::new();
        match self.submit(&post, errors.clone()).await {
            Ok(()) => posts.push(post),
            Err(message) => {
                creation_errors.insert(post.platform, message);
            }
        }

        Ok(PublishResponse {
            posts,
            creation_errors,
            errors,
        })
    }
}
