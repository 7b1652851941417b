//! CLI tests for polycast-post

use assert_cmd::Command;
use predicates::prelude::*;
use secrecy::SecretString;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use libpolycast::store::{ConnectionStore, PostStore, TokenStore};
use libpolycast::types::{PlatformConnection, Token};
use libpolycast::{Database, Platform, PostStatus};

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

/// Config with an X section but no connected accounts
fn setup_test_env() -> (TempDir, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("data").join("posts.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[x]
client_id = "test-client"
client_secret = "test-secret"
redirect_uri = "https://example.com/callback/x"
"#,
        escape_path_for_toml(&db_path.to_string_lossy())
    );
    fs::write(&config_path, config_content).unwrap();

    (temp_dir, config_path.to_string_lossy().to_string())
}

fn polycast_post(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("polycast-post").unwrap();
    cmd.env("POLYCAST_CONFIG", config_path)
        .env_remove("POLYCAST_DB_PATH")
        .env_remove("POLYCAST_USER");
    cmd
}

#[test]
fn test_help_lists_flags() {
    Command::cargo_bin("polycast-post")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--platform"))
        .stdout(predicate::str::contains("--caption"))
        .stdout(predicate::str::contains("--privacy"))
        .stdout(predicate::str::contains("--inbox"))
        .stdout(predicate::str::contains("--wait"))
        .stdout(predicate::str::contains("--format"));
}

#[test]
fn test_media_url_is_required() {
    let (_temp_dir, config_path) = setup_test_env();
    polycast_post(&config_path)
        .args(["--user", "1", "--platform", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MEDIA_URL"));
}

#[test]
fn test_unconnected_platform_exits_with_3() {
    let (_temp_dir, config_path) = setup_test_env();
    polycast_post(&config_path)
        .args(["--user", "1", "--platform", "x", "https://cdn.example.com/a.mp4"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Platform not connected: x"));
}

#[test]
fn test_unknown_platform_exits_with_3() {
    let (_temp_dir, config_path) = setup_test_env();
    polycast_post(&config_path)
        .args(["--user", "1", "-p", "x,myspace", "https://cdn.example.com/a.mp4"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown platform 'myspace'"));
}

#[test]
fn test_missing_config_exits_with_1() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");
    polycast_post(&missing.to_string_lossy())
        .args(["--user", "1", "-p", "x", "https://cdn.example.com/a.mp4"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_user_can_come_from_environment() {
    let (_temp_dir, config_path) = setup_test_env();
    polycast_post(&config_path)
        .env("POLYCAST_USER", "9")
        .args(["-p", "tiktok", "https://cdn.example.com/a.mp4"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("tiktok"));
}

/// Config whose X endpoints point at a closed port
fn setup_unreachable_x() -> (TempDir, String, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("data").join("posts.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[x]
client_id = "test-client"
client_secret = "test-secret"
redirect_uri = "https://example.com/callback/x"
api_base = "http://127.0.0.1:1"
upload_base = "http://127.0.0.1:1"
timeout_secs = 5
"#,
        escape_path_for_toml(&db_path.to_string_lossy())
    );
    fs::write(&config_path, config_content).unwrap();

    (temp_dir, config_path.to_string_lossy().to_string(), db_path)
}

async fn connect_x(db: &Database, user_id: i64) {
    let now = chrono::Utc::now().timestamp();
    db.upsert_token(&Token {
        user_id,
        platform: Platform::X,
        access_token: SecretString::from("stored-access".to_string()),
        refresh_token: None,
        token_type: "bearer".to_string(),
        expires_at: now + 30 * 24 * 3600,
        scope: String::new(),
        updated_at: now,
    })
    .await
    .unwrap();
    db.upsert_connection(&PlatformConnection {
        user_id,
        platform: Platform::X,
        platform_user_id: "42".to_string(),
        username: "studio".to_string(),
        display_name: "Studio".to_string(),
        avatar_url: String::new(),
        is_active: true,
        connected_at: now,
        last_used_at: None,
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_jobs_finish_before_exit_without_wait() {
    let (_temp_dir, config_path, db_path) = setup_unreachable_x();
    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    connect_x(&db, 1).await;
    db.pool().close().await;

    let output = polycast_post(&config_path)
        .args(["--user", "1", "-p", "x", "--format", "json", "http://127.0.0.1:1/a.mp4"])
        .output()
        .unwrap();
    assert!(output.status.success());

    // Without --wait the report shows the records as accepted
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["posts"][0]["status"], "pending");

    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    let posts = db.list_user_posts(1, Some(Platform::X), 10, 0).await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].status, PostStatus::Failed);
    assert!(posts[0].error_message.is_some());
}

#[tokio::test]
async fn test_wait_reports_final_outcome() {
    let (_temp_dir, config_path, db_path) = setup_unreachable_x();
    let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
    connect_x(&db, 1).await;
    db.pool().close().await;

    let output = polycast_post(&config_path)
        .args(["--user", "1", "-p", "x", "--wait", "--format", "json", "http://127.0.0.1:1/a.mp4"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["posts"][0]["status"], "failed");
    assert!(report["posts"][0]["error"].is_string());
}
