//! Persistence seams used by the publishing core
//!
//! The orchestrator only talks to these traits. [`crate::db::Database`]
//! implements all three over SQLite; tests substitute wrappers that inject
//! failures.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Platform, PlatformConnection, Post, PostStatus, Token};

/// Durable per-platform post records.
///
/// Every mutating call returns `true` when a row changed. Writes against a
/// record already in a terminal state are ignored and return `false`, with
/// [`PostStore::reset_for_reprocess`] as the single exception.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(&self, post: &Post) -> Result<()>;

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>>;

    /// Move a non-terminal record to `status`, recording `error` on failure
    async fn update_status(
        &self,
        post_id: &str,
        status: PostStatus,
        error: Option<&str>,
    ) -> Result<bool>;

    /// Terminal success. An already stored platform post ID is never replaced.
    async fn mark_published(
        &self,
        post_id: &str,
        platform_post_id: &str,
        share_url: Option<&str>,
    ) -> Result<bool>;

    /// Terminal hand-off to the creator's inbox
    async fn mark_sent_to_inbox(&self, post_id: &str, publish_handle: &str) -> Result<bool>;

    /// Put a `failed` record back to `pending` so it can be submitted again
    async fn reset_for_reprocess(&self, post_id: &str) -> Result<bool>;

    async fn list_user_posts(
        &self,
        user_id: i64,
        platform: Option<Platform>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Post>>;
}

/// OAuth credentials, at most one per (user, platform)
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get_token(&self, user_id: i64, platform: Platform) -> Result<Option<Token>>;

    /// Create or replace the token for `(token.user_id, token.platform)`
    async fn upsert_token(&self, token: &Token) -> Result<()>;

    async fn delete_token(&self, user_id: i64, platform: Platform) -> Result<bool>;
}

/// Which platforms a user has linked
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Every connection row for the user, active or not
    async fn connected_platforms(&self, user_id: i64) -> Result<Vec<PlatformConnection>>;

    async fn get_connection(
        &self,
        user_id: i64,
        platform: Platform,
    ) -> Result<Option<PlatformConnection>>;

    async fn upsert_connection(&self, connection: &PlatformConnection) -> Result<()>;

    async fn deactivate_connection(&self, user_id: i64, platform: Platform) -> Result<bool>;

    /// Record that the connection was just used to publish
    async fn touch_connection(&self, user_id: i64, platform: Platform) -> Result<()>;
}
