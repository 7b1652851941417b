//! polycast-post - Publish media to several social platforms at once

use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;

use libpolycast::logging::LoggingConfig;
use libpolycast::service::publishing::{PublishRequest, PublishResponse};
use libpolycast::{
    Platform, PlatformSettings, PolycastError, PolycastService, Post, PostStatus, Result,
    TikTokSettings,
};

#[derive(Parser, Debug)]
#[command(name = "polycast-post")]
#[command(version, about = "Publish media to TikTok, X and Instagram")]
#[command(long_about = r#"Publish media to TikTok, X and Instagram.

One post record is created per platform and published concurrently. The
command always stays up until every platform job has finished. Without
--wait it reports the records as they were accepted; with --wait it
reports each platform's final outcome.

EXAMPLES:
    # Publish a video to X and TikTok
    polycast-post --user 1 --platform x,tiktok --privacy PUBLIC_TO_EVERYONE \
        --caption "Launch day" https://cdn.example.com/launch.mp4

    # Instagram carousel, waiting for the outcome
    polycast-post --user 1 -p instagram --wait \
        https://cdn.example.com/1.jpg https://cdn.example.com/2.jpg

    # Send a draft to the TikTok inbox
    polycast-post --user 1 -p tiktok --inbox https://cdn.example.com/draft.mp4

EXIT CODES:
    0 - Every platform accepted (or, with --wait, published) the post
    1 - At least one platform failed
    2 - Authentication error
    3 - Invalid input or platform not connected
"#)]
struct Cli {
    /// Media URLs, primary first
    #[arg(required = true, value_name = "MEDIA_URL")]
    media: Vec<String>,

    /// User to publish as
    #[arg(short, long, env = "POLYCAST_USER")]
    user: i64,

    /// Target platform(s) (tiktok, x, instagram; repeatable or comma-separated)
    #[arg(short, long, required = true, value_delimiter = ',')]
    platform: Vec<String>,

    /// Caption / post text
    #[arg(short, long, default_value = "")]
    caption: String,

    /// TikTok privacy level, e.g. PUBLIC_TO_EVERYONE
    #[arg(long, value_name = "LEVEL")]
    privacy: Option<String>,

    /// TikTok title
    #[arg(long)]
    title: Option<String>,

    /// Allow comments on TikTok
    #[arg(long)]
    allow_comment: bool,

    /// Allow duets on TikTok
    #[arg(long)]
    allow_duet: bool,

    /// Allow stitches on TikTok
    #[arg(long)]
    allow_stitch: bool,

    /// Disclose as promoting your own brand (TikTok)
    #[arg(long)]
    brand_content: bool,

    /// Disclose as a paid partnership (TikTok)
    #[arg(long)]
    brand_organic: bool,

    /// Let TikTok add music to photo posts
    #[arg(long)]
    auto_add_music: bool,

    /// Send to the TikTok inbox instead of posting directly
    #[arg(long)]
    inbox: bool,

    /// Report each platform's final state instead of the accepted records
    #[arg(short, long)]
    wait: bool,

    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn tiktok_settings(&self) -> Option<TikTokSettings> {
        let any = self.privacy.is_some()
            || self.title.is_some()
            || self.allow_comment
            || self.allow_duet
            || self.allow_stitch
            || self.brand_content
            || self.brand_organic
            || self.auto_add_music
            || self.inbox;
        if !any {
            return None;
        }

        Some(TikTokSettings {
            title: self.title.clone().unwrap_or_default(),
            privacy_level: self.privacy.clone().unwrap_or_default(),
            allow_comment: self.allow_comment,
            allow_duet: self.allow_duet,
            allow_stitch: self.allow_stitch,
            is_brand_content: self.brand_content,
            is_brand_organic: self.brand_organic,
            auto_add_music: self.auto_add_music,
            direct_post: !self.inbox,
        })
    }

    fn request(&self) -> PublishRequest {
        PublishRequest {
            user_id: self.user,
            platforms: self.platform.clone(),
            media_urls: self.media.clone(),
            caption: self.caption.clone(),
            settings: self.tiktok_settings().map(|tiktok| PlatformSettings {
                tiktok: Some(tiktok),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct PostSummary {
    post_id: String,
    platform: Platform,
    status: PostStatus,
    platform_post_id: Option<String>,
    share_url: Option<String>,
    error: Option<String>,
}

impl From<&Post> for PostSummary {
    fn from(post: &Post) -> Self {
        Self {
            post_id: post.id.clone(),
            platform: post.platform,
            status: post.status,
            platform_post_id: post.platform_post_id.clone(),
            share_url: post.share_url.clone(),
            error: post.error_message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    posts: Vec<PostSummary>,
    /// Platforms that never got a post record
    errors: BTreeMap<Platform, String>,
}

impl Report {
    fn failed(&self) -> bool {
        !self.errors.is_empty() || self.posts.iter().any(|p| p.status == PostStatus::Failed)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("error", cli.verbose).init();
    tracing::debug!(platforms = ?cli.platform, media = cli.media.len(), "polycast-post started");

    match run(&cli).await {
        Ok(report) => {
            if let Err(e) = print_report(&report, &cli.format) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
            if report.failed() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: &Cli) -> Result<Report> {
    let service = PolycastService::new().await?;
    let response = service.publishing().create_post(cli.request()).await?;

    // Jobs live on this process's runtime and die with it
    service.wait_idle().await;

    let posts = if cli.wait {
        refresh(&service, &response, cli.user).await?
    } else {
        response.posts.clone()
    };

    Ok(Report {
        posts: posts.iter().map(PostSummary::from).collect(),
        errors: response.creation_errors.into_iter().collect(),
    })
}

/// Re-read every created post once the jobs have settled
async fn refresh(
    service: &PolycastService,
    response: &PublishResponse,
    user_id: i64,
) -> Result<Vec<Post>> {
    let mut posts = Vec::with_capacity(response.posts.len());
    for post in &response.posts {
        posts.push(service.publishing().get_post_status(&post.id, user_id).await?);
    }
    Ok(posts)
}

fn print_report(report: &Report, format: &str) -> Result<()> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(report)
                .map_err(|e| PolycastError::InvalidInput(format!("JSON serialization failed: {}", e)))?;
            println!("{}", json);
        }
        _ => {
            for post in &report.posts {
                let mut line = format!("{}:{}:{}", post.platform, post.status, post.post_id);
                if let Some(url) = &post.share_url {
                    line.push(' ');
                    line.push_str(url);
                } else if let Some(id) = &post.platform_post_id {
                    line.push(' ');
                    line.push_str(id);
                }
                println!("{}", line);
                if let Some(error) = &post.error {
                    eprintln!("Error [{}]: {}", post.platform, error);
                }
            }
            for (platform, error) in &report.errors {
                eprintln!("Error [{}]: {}", platform, error);
            }
        }
    }
    Ok(())
}
