use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use libpolycast::config::{resolve_db_path, Config};
use libpolycast::logging::LoggingConfig;
use libpolycast::{Platform, PolycastService, Post, PostStatus};

#[derive(Parser, Debug)]
#[command(name = "polycast-history")]
#[command(version, about = "Query publishing history")]
#[command(long_about = r#"Query publishing history with filtering and formatting options.

EXAMPLES:
    # Show the last 20 posts (default)
    polycast-history --user 1

    # Only TikTok, next page
    polycast-history --user 1 --platform tiktok --limit 20 --offset 20

    # One post
    polycast-history --user 1 --post 6f1c2a7e-...

    # Failed posts as JSON
    polycast-history --user 1 --format json | jq '.[] | select(.status == "failed")'

    # Export to CSV for analysis
    polycast-history --user 1 --format csv > posts.csv

OUTPUT FORMATS:
    text  - Human-readable text (default)
    json  - JSON array
    jsonl - JSON lines, one object per line
    csv   - CSV with headers

EXIT CODES:
    0 - Success (including empty results)
    1 - Error (database not found, query failed, etc.)
    4 - --post given and no such post for this user
"#)]
struct Args {
    /// User whose posts to list
    #[arg(short, long, env = "POLYCAST_USER")]
    user: i64,

    /// Filter by platform (tiktok, x, instagram)
    #[arg(short, long, value_name = "PLATFORM")]
    platform: Option<String>,

    /// Maximum number of posts to return (capped at 100)
    #[arg(short, long, default_value = "20", value_name = "N")]
    limit: u32,

    /// Number of posts to skip
    #[arg(long, default_value = "0", value_name = "N")]
    offset: u32,

    /// Show a single post by ID
    #[arg(long, value_name = "POST_ID", conflicts_with_all = ["platform", "offset"])]
    post: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json", "jsonl", "csv"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// One post as printed
#[derive(Debug, Serialize)]
struct HistoryEntry {
    post_id: String,
    platform: Platform,
    status: PostStatus,
    media_kind: String,
    media_urls: Vec<String>,
    caption: String,
    platform_post_id: Option<String>,
    share_url: Option<String>,
    error: Option<String>,
    created_at: i64,
    published_at: Option<i64>,
}

impl From<Post> for HistoryEntry {
    fn from(post: Post) -> Self {
        let media_urls = post.all_media_urls();
        Self {
            post_id: post.id,
            platform: post.platform,
            status: post.status,
            media_kind: post.media_kind.to_string(),
            media_urls,
            caption: post.caption,
            platform_post_id: post.platform_post_id,
            share_url: post.share_url,
            error: post.error_message,
            created_at: post.created_at,
            published_at: post.published_at,
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn print_entries(entries: &[HistoryEntry], format: &str) -> Result<()> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(entries)?);
        }
        "jsonl" => {
            for entry in entries {
                println!("{}", serde_json::to_string(entry)?);
            }
        }
        "csv" => {
            println!("post_id,created_at,platform,status,platform_post_id,share_url,error,caption");
            for entry in entries {
                println!(
                    "{},{},{},{},{},{},{},{}",
                    entry.post_id,
                    entry.created_at,
                    entry.platform,
                    entry.status,
                    csv_field(entry.platform_post_id.as_deref().unwrap_or("")),
                    csv_field(entry.share_url.as_deref().unwrap_or("")),
                    csv_field(entry.error.as_deref().unwrap_or("")),
                    csv_field(&entry.caption),
                );
            }
        }
        _ => {
            for entry in entries {
                let dt = chrono::DateTime::from_timestamp(entry.created_at, 0)
                    .unwrap_or_else(chrono::Utc::now);
                let symbol = match entry.status {
                    PostStatus::Published | PostStatus::SentToInbox => "✓",
                    PostStatus::Failed => "✗",
                    PostStatus::Pending | PostStatus::Processing => "…",
                };

                let caption: String = entry.caption.chars().take(60).collect();
                let ellipsis = if entry.caption.chars().count() > 60 { "..." } else { "" };
                println!(
                    "{} | {} | {} {} {} | {}{}",
                    dt.format("%Y-%m-%d %H:%M:%S"),
                    entry.post_id,
                    symbol,
                    entry.platform,
                    entry.status,
                    caption,
                    ellipsis
                );

                if let Some(url) = &entry.share_url {
                    println!("  {}", url);
                } else if let Some(id) = &entry.platform_post_id {
                    println!("  {}", id);
                }
                if let Some(error) = &entry.error {
                    println!("  error: {}", error);
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    LoggingConfig::from_env("warn", args.verbose).init();
    tracing::debug!("polycast-history started with args: {:?}", args);

    let config = Config::load().context("Failed to load configuration")?;

    let db_path = resolve_db_path(Some(&config.database.path))?;
    if !db_path.exists() {
        eprintln!("Error: Database not found at {}", db_path.display());
        eprintln!("Have you published anything yet? Try: polycast-post --help");
        std::process::exit(1);
    }

    let service = PolycastService::from_config(config)
        .await
        .context("Failed to open database")?;
    let publishing = service.publishing();

    let entries: Vec<HistoryEntry> = match &args.post {
        Some(post_id) => match publishing.get_post_status(post_id, args.user).await {
            Ok(post) => vec![post.into()],
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(e.exit_code());
            }
        },
        None => {
            let platform = args
                .platform
                .as_deref()
                .map(|p| p.parse::<Platform>())
                .transpose()?;
            publishing
                .get_user_posts(args.user, platform, args.limit, args.offset)
                .await
                .context("Failed to query history")?
                .into_iter()
                .map(HistoryEntry::from)
                .collect()
        }
    };

    print_entries(&entries, &args.format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field(""), "");
    }
}
