//! Database operations for Polycast

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::store::{ConnectionStore, PostStore, TokenStore};
use crate::types::{
    MediaKind, Platform, PlatformConnection, PlatformSettings, Post, PostStatus, Token,
};

const TERMINAL_STATUSES: &str = "('published', 'failed', 'sent_to_inbox')";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the file on first use
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn parse_platform(raw: &str) -> Result<Platform> {
    raw.parse::<Platform>()
        .map_err(|_| DbError::CorruptRow(format!("unknown platform '{}'", raw)).into())
}

fn post_from_row(row: &SqliteRow) -> Result<Post> {
    let platform = parse_platform(&row.get::<String, _>("platform"))?;

    let status_raw: String = row.get("status");
    let status = status_raw
        .parse::<PostStatus>()
        .map_err(|_| DbError::CorruptRow(format!("unknown status '{}'", status_raw)))?;

    let kind_raw: String = row.get("media_kind");
    let media_kind = kind_raw
        .parse::<MediaKind>()
        .map_err(|_| DbError::CorruptRow(format!("unknown media kind '{}'", kind_raw)))?;

    let additional: String = row.get("additional_media_urls");
    let additional_media_urls: Vec<String> = serde_json::from_str(&additional)
        .map_err(|e| DbError::CorruptRow(format!("additional_media_urls: {}", e)))?;

    let settings = match row.get::<Option<String>, _>("settings") {
        Some(raw) => Some(
            serde_json::from_str::<PlatformSettings>(&raw)
                .map_err(|e| DbError::CorruptRow(format!("settings: {}", e)))?,
        ),
        None => None,
    };

    Ok(Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        platform,
        media_url: row.get("media_url"),
        additional_media_urls,
        caption: row.get("caption"),
        media_kind,
        settings,
        status,
        platform_post_id: row.get("platform_post_id"),
        share_url: row.get("share_url"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        published_at: row.get("published_at"),
    })
}

fn connection_from_row(row: &SqliteRow) -> Result<PlatformConnection> {
    Ok(PlatformConnection {
        user_id: row.get("user_id"),
        platform: parse_platform(&row.get::<String, _>("platform"))?,
        platform_user_id: row.get("platform_user_id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        avatar_url: row.get("avatar_url"),
        is_active: row.get::<i64, _>("is_active") != 0,
        connected_at: row.get("connected_at"),
        last_used_at: row.get("last_used_at"),
    })
}

#[async_trait]
impl PostStore for Database {
    async fn create_post(&self, post: &Post) -> Result<()> {
        let additional = serde_json::to_string(&post.additional_media_urls)
            .map_err(|e| DbError::CorruptRow(e.to_string()))?;
        let settings = match &post.settings {
            Some(settings) => Some(
                serde_json::to_string(settings).map_err(|e| DbError::CorruptRow(e.to_string()))?,
            ),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO posts (
                id, user_id, platform, media_url, additional_media_urls, caption,
                media_kind, settings, status, platform_post_id, share_url,
                error_message, created_at, published_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(post.user_id)
        .bind(post.platform.as_str())
        .bind(&post.media_url)
        .bind(additional)
        .bind(&post.caption)
        .bind(post.media_kind.as_str())
        .bind(settings)
        .bind(post.status.as_str())
        .bind(&post.platform_post_id)
        .bind(&post.share_url)
        .bind(&post.error_message)
        .bind(post.created_at)
        .bind(post.published_at)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT * FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(post_from_row).transpose()
    }

    async fn update_status(
        &self,
        post_id: &str,
        status: PostStatus,
        error: Option<&str>,
    ) -> Result<bool> {
        let sql = format!(
            r#"
            UPDATE posts
            SET status = ?, error_message = ?, updated_at = ?
            WHERE id = ? AND status NOT IN {}
            "#,
            TERMINAL_STATUSES
        );

        let result = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(error)
            .bind(now())
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_published(
        &self,
        post_id: &str,
        platform_post_id: &str,
        share_url: Option<&str>,
    ) -> Result<bool> {
        let ts = now();
        let sql = format!(
            r#"
            UPDATE posts
            SET status = 'published',
                platform_post_id = COALESCE(platform_post_id, ?),
                share_url = COALESCE(?, share_url),
                error_message = NULL,
                published_at = ?,
                updated_at = ?
            WHERE id = ? AND status NOT IN {}
            "#,
            TERMINAL_STATUSES
        );

        let result = sqlx::query(&sql)
            .bind(platform_post_id)
            .bind(share_url)
            .bind(ts)
            .bind(ts)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_sent_to_inbox(&self, post_id: &str, publish_handle: &str) -> Result<bool> {
        let sql = format!(
            r#"
            UPDATE posts
            SET status = 'sent_to_inbox',
                platform_post_id = COALESCE(platform_post_id, ?),
                error_message = NULL,
                updated_at = ?
            WHERE id = ? AND status NOT IN {}
            "#,
            TERMINAL_STATUSES
        );

        let result = sqlx::query(&sql)
            .bind(publish_handle)
            .bind(now())
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn reset_for_reprocess(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'pending', error_message = NULL, updated_at = ?
            WHERE id = ? AND status = 'failed'
            "#,
        )
        .bind(now())
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_user_posts(
        &self,
        user_id: i64,
        platform: Option<Platform>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Post>> {
        let rows = match platform {
            Some(platform) => {
                sqlx::query(
                    r#"
                    SELECT * FROM posts
                    WHERE user_id = ? AND platform = ?
                    ORDER BY created_at DESC, rowid DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(user_id)
                .bind(platform.as_str())
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM posts
                    WHERE user_id = ?
                    ORDER BY created_at DESC, rowid DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(user_id)
                .bind(limit as i64)
                .bind(offset as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }
}

#[async_trait]
impl TokenStore for Database {
    async fn get_token(&self, user_id: i64, platform: Platform) -> Result<Option<Token>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, platform, access_token, refresh_token, token_type,
                   expires_at, scope, updated_at
            FROM tokens WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| Token {
            user_id: r.get("user_id"),
            platform,
            access_token: SecretString::from(r.get::<String, _>("access_token")),
            refresh_token: r
                .get::<Option<String>, _>("refresh_token")
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            token_type: r.get("token_type"),
            expires_at: r.get("expires_at"),
            scope: r.get("scope"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn upsert_token(&self, token: &Token) -> Result<()> {
        let ts = now();
        sqlx::query(
            r#"
            INSERT INTO tokens (
                user_id, platform, access_token, refresh_token, token_type,
                expires_at, scope, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                expires_at = excluded.expires_at,
                scope = excluded.scope,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(token.user_id)
        .bind(token.platform.as_str())
        .bind(token.access_token.expose_secret())
        .bind(token.refresh_token.as_ref().map(|t| t.expose_secret().to_string()))
        .bind(&token.token_type)
        .bind(token.expires_at)
        .bind(&token.scope)
        .bind(ts)
        .bind(ts)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn delete_token(&self, user_id: i64, platform: Platform) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tokens WHERE user_id = ? AND platform = ?")
            .bind(user_id)
            .bind(platform.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ConnectionStore for Database {
    async fn connected_platforms(&self, user_id: i64) -> Result<Vec<PlatformConnection>> {
        let rows = sqlx::query(
            "SELECT * FROM platform_connections WHERE user_id = ? ORDER BY platform",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(connection_from_row).collect()
    }

    async fn get_connection(
        &self,
        user_id: i64,
        platform: Platform,
    ) -> Result<Option<PlatformConnection>> {
        let row = sqlx::query(
            "SELECT * FROM platform_connections WHERE user_id = ? AND platform = ?",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(connection_from_row).transpose()
    }

    async fn upsert_connection(&self, connection: &PlatformConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_connections (
                user_id, platform, platform_user_id, username, display_name,
                avatar_url, is_active, connected_at, last_used_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                platform_user_id = excluded.platform_user_id,
                username = excluded.username,
                display_name = excluded.display_name,
                avatar_url = excluded.avatar_url,
                is_active = excluded.is_active,
                connected_at = excluded.connected_at
            "#,
        )
        .bind(connection.user_id)
        .bind(connection.platform.as_str())
        .bind(&connection.platform_user_id)
        .bind(&connection.username)
        .bind(&connection.display_name)
        .bind(&connection.avatar_url)
        .bind(connection.is_active as i64)
        .bind(connection.connected_at)
        .bind(connection.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn deactivate_connection(&self, user_id: i64, platform: Platform) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE platform_connections SET is_active = 0 WHERE user_id = ? AND platform = ? AND is_active = 1",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_connection(&self, user_id: i64, platform: Platform) -> Result<()> {
        sqlx::query(
            "UPDATE platform_connections SET last_used_at = ? WHERE user_id = ? AND platform = ?",
        )
        .bind(now())
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolycastError;
    use crate::types::TikTokSettings;
    use tempfile::TempDir;

    async fn setup_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (db, temp_dir)
    }

    fn video_post(user_id: i64, platform: Platform) -> Post {
        Post::new(
            user_id,
            platform,
            &["https://cdn.example.com/a.mp4".to_string()],
            "caption".to_string(),
            MediaKind::Video,
            None,
        )
    }

    fn connection(user_id: i64, platform: Platform) -> PlatformConnection {
        PlatformConnection {
            user_id,
            platform,
            platform_user_id: format!("{}-user", platform),
            username: "creator".to_string(),
            display_name: "Creator".to_string(),
            avatar_url: String::new(),
            is_active: true,
            connected_at: now(),
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn test_database_initialization_with_invalid_path() {
        #[cfg(unix)]
        let invalid_path = "/tmp/test\0invalid.db";

        #[cfg(windows)]
        let invalid_path = "C:\\invalid<>path\\test.db";

        let result = Database::new(invalid_path).await;
        assert!(matches!(result, Err(PolycastError::Database(_))));
    }

    #[tokio::test]
    async fn test_create_and_get_post_round_trips_payload() {
        let (db, _temp_dir) = setup_db().await;

        let settings = PlatformSettings {
            tiktok: Some(TikTokSettings {
                privacy_level: "SELF_ONLY".to_string(),
                ..Default::default()
            }),
        };
        let post = Post::new(
            1,
            Platform::Instagram,
            &[
                "https://cdn.example.com/a.jpg".to_string(),
                "https://cdn.example.com/b.jpg".to_string(),
            ],
            "hello".to_string(),
            MediaKind::Carousel,
            Some(settings.clone()),
        );
        db.create_post(&post).await.unwrap();

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.platform, Platform::Instagram);
        assert_eq!(stored.media_kind, MediaKind::Carousel);
        assert_eq!(stored.additional_media_urls, vec!["https://cdn.example.com/b.jpg"]);
        assert_eq!(stored.settings, Some(settings));
        assert_eq!(stored.status, PostStatus::Pending);
    }

    #[tokio::test]
    async fn test_get_missing_post() {
        let (db, _temp_dir) = setup_db().await;
        assert!(db.get_post("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_status_is_not_overwritten() {
        let (db, _temp_dir) = setup_db().await;
        let post = video_post(1, Platform::X);
        db.create_post(&post).await.unwrap();

        assert!(db.update_status(&post.id, PostStatus::Processing, None).await.unwrap());
        assert!(db
            .mark_published(&post.id, "tweet-1", Some("https://twitter.com/i/web/status/tweet-1"))
            .await
            .unwrap());

        assert!(!db
            .update_status(&post.id, PostStatus::Failed, Some("late failure"))
            .await
            .unwrap());
        assert!(!db.mark_published(&post.id, "tweet-2", None).await.unwrap());

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert_eq!(stored.platform_post_id.as_deref(), Some("tweet-1"));
        assert!(stored.error_message.is_none());
        assert!(stored.published_at.is_some());
    }

    #[tokio::test]
    async fn test_sent_to_inbox_is_terminal() {
        let (db, _temp_dir) = setup_db().await;
        let post = video_post(1, Platform::TikTok);
        db.create_post(&post).await.unwrap();

        assert!(db.mark_sent_to_inbox(&post.id, "v_inbox_1").await.unwrap());
        assert!(!db.update_status(&post.id, PostStatus::Processing, None).await.unwrap());

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::SentToInbox);
        assert_eq!(stored.platform_post_id.as_deref(), Some("v_inbox_1"));
    }

    #[tokio::test]
    async fn test_reset_only_applies_to_failed() {
        let (db, _temp_dir) = setup_db().await;
        let post = video_post(1, Platform::X);
        db.create_post(&post).await.unwrap();

        assert!(!db.reset_for_reprocess(&post.id).await.unwrap());

        db.update_status(&post.id, PostStatus::Failed, Some("boom"))
            .await
            .unwrap();
        assert!(db.reset_for_reprocess(&post.id).await.unwrap());

        let stored = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Pending);
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_list_user_posts_filters_and_paginates() {
        let (db, _temp_dir) = setup_db().await;

        for _ in 0..3 {
            db.create_post(&video_post(1, Platform::X)).await.unwrap();
        }
        db.create_post(&video_post(1, Platform::TikTok)).await.unwrap();
        db.create_post(&video_post(2, Platform::X)).await.unwrap();

        assert_eq!(db.list_user_posts(1, None, 20, 0).await.unwrap().len(), 4);
        assert_eq!(
            db.list_user_posts(1, Some(Platform::X), 20, 0).await.unwrap().len(),
            3
        );
        assert_eq!(db.list_user_posts(1, None, 2, 0).await.unwrap().len(), 2);
        assert_eq!(db.list_user_posts(1, None, 20, 3).await.unwrap().len(), 1);
        assert!(db.list_user_posts(3, None, 20, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_token_upsert_replaces() {
        let (db, _temp_dir) = setup_db().await;

        let mut token = Token {
            user_id: 1,
            platform: Platform::TikTok,
            access_token: SecretString::from("access-1".to_string()),
            refresh_token: Some(SecretString::from("refresh-1".to_string())),
            token_type: "Bearer".to_string(),
            expires_at: 1000,
            scope: "video.publish".to_string(),
            updated_at: 0,
        };
        db.upsert_token(&token).await.unwrap();

        token.access_token = SecretString::from("access-2".to_string());
        token.refresh_token = None;
        token.expires_at = 2000;
        db.upsert_token(&token).await.unwrap();

        let stored = db.get_token(1, Platform::TikTok).await.unwrap().unwrap();
        assert_eq!(stored.access_token.expose_secret(), "access-2");
        assert!(stored.refresh_token.is_none());
        assert_eq!(stored.expires_at, 2000);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tokens")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        assert!(db.delete_token(1, Platform::TikTok).await.unwrap());
        assert!(db.get_token(1, Platform::TikTok).await.unwrap().is_none());
        assert!(!db.delete_token(1, Platform::TikTok).await.unwrap());
    }

    #[tokio::test]
    async fn test_connections_lifecycle() {
        let (db, _temp_dir) = setup_db().await;

        db.upsert_connection(&connection(1, Platform::X)).await.unwrap();
        db.upsert_connection(&connection(1, Platform::TikTok)).await.unwrap();
        db.upsert_connection(&connection(2, Platform::Instagram)).await.unwrap();

        let connected = db.connected_platforms(1).await.unwrap();
        assert_eq!(connected.len(), 2);
        assert!(connected.iter().all(|c| c.is_active));

        assert!(db.deactivate_connection(1, Platform::X).await.unwrap());
        let x = db.get_connection(1, Platform::X).await.unwrap().unwrap();
        assert!(!x.is_active);

        db.touch_connection(1, Platform::TikTok).await.unwrap();
        let tiktok = db.get_connection(1, Platform::TikTok).await.unwrap().unwrap();
        assert!(tiktok.last_used_at.is_some());

        // Reconnecting reactivates the same row
        db.upsert_connection(&connection(1, Platform::X)).await.unwrap();
        let x = db.get_connection(1, Platform::X).await.unwrap().unwrap();
        assert!(x.is_active);
        assert_eq!(db.connected_platforms(1).await.unwrap().len(), 2);
    }
}
