//! polycast-connect - Link social platform accounts to Polycast
//!
//! Linking is a two-step OAuth flow: `url` prints the authorization URL to
//! open in a browser, `exchange` trades the code from the callback for a
//! token.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use libpolycast::logging::LoggingConfig;
use libpolycast::service::connections::ConnectionStatus;
use libpolycast::{Platform, PolycastError, PolycastService};

#[derive(Parser)]
#[command(name = "polycast-connect")]
#[command(version, about = "Manage Polycast platform connections", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the authorization URL for a platform
    Url {
        /// Platform name (tiktok, x, instagram)
        platform: String,
    },

    /// Complete a connection with the code from the OAuth callback
    Exchange {
        /// Platform name (tiktok, x, instagram)
        platform: String,

        /// User to connect the account to
        #[arg(short, long, env = "POLYCAST_USER")]
        user: i64,

        /// Authorization code from the callback
        #[arg(long)]
        code: String,

        /// PKCE verifier printed by `url` (X only)
        #[arg(long)]
        verifier: Option<String>,
    },

    /// Disconnect a platform and forget its token
    Disconnect {
        /// Platform name (tiktok, x, instagram)
        platform: String,

        /// User to disconnect
        #[arg(short, long, env = "POLYCAST_USER")]
        user: i64,
    },

    /// Show connection state for every platform
    Status {
        /// User to inspect
        #[arg(short, long, env = "POLYCAST_USER")]
        user: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("warn", cli.verbose).init();

    if let Err(e) = run_command(cli.command, &cli.format).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<PolycastError>()
            .map(|e| e.exit_code())
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn parse_platform(name: &str) -> Result<Platform> {
    Ok(name.parse::<Platform>()?)
}

async fn open_service() -> Result<PolycastService> {
    PolycastService::new()
        .await
        .context("Failed to initialize Polycast")
}

async fn run_command(command: Commands, format: &str) -> Result<()> {
    match command {
        Commands::Url { platform } => print_auth_url(parse_platform(&platform)?, format).await,
        Commands::Exchange {
            platform,
            user,
            code,
            verifier,
        } => exchange(parse_platform(&platform)?, user, &code, verifier, format).await,
        Commands::Disconnect { platform, user } => {
            disconnect(parse_platform(&platform)?, user, format).await
        }
        Commands::Status { user } => status(user, format).await,
    }
}

async fn print_auth_url(platform: Platform, format: &str) -> Result<()> {
    let service = open_service().await?;
    let auth = service.connections().authorization_url(platform)?;

    if format == "json" {
        let output = json!({
            "platform": platform,
            "url": auth.url,
            "state": auth.state,
            "code_verifier": auth.code_verifier,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Open this URL to connect {}:", platform.display_name());
    println!();
    println!("  {}", auth.url);
    println!();
    println!("state: {}", auth.state);
    if let Some(verifier) = &auth.code_verifier {
        println!("verifier: {}", verifier);
        println!();
        println!(
            "Then run: polycast-connect exchange {} --user <ID> --code <CODE> --verifier {}",
            platform, verifier
        );
    } else {
        println!();
        println!(
            "Then run: polycast-connect exchange {} --user <ID> --code <CODE>",
            platform
        );
    }
    Ok(())
}

async fn exchange(
    platform: Platform,
    user: i64,
    code: &str,
    verifier: Option<String>,
    format: &str,
) -> Result<()> {
    let service = open_service().await?;
    let connection = service
        .connections()
        .complete_connection(user, platform, code, verifier)
        .await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&connection)?);
    } else {
        println!(
            "✓ Connected {} account @{} ({})",
            platform.display_name(),
            connection.username,
            connection.platform_user_id
        );
    }
    Ok(())
}

async fn disconnect(platform: Platform, user: i64, format: &str) -> Result<()> {
    let service = open_service().await?;
    let removed = service.connections().disconnect(user, platform).await?;

    if format == "json" {
        println!(
            "{}",
            json!({ "platform": platform, "disconnected": removed })
        );
    } else if removed {
        println!("✓ Disconnected {}", platform.display_name());
    } else {
        println!("{} was not connected", platform.display_name());
    }
    Ok(())
}

fn describe(status: &ConnectionStatus, now: i64) -> String {
    if !status.available {
        return "not configured".to_string();
    }
    match &status.connection {
        Some(connection) if connection.is_active => {
            let expiry = match status.token_expires_at {
                None => " (no token, reconnect)".to_string(),
                Some(0) => String::new(),
                Some(at) if at <= now => " (token expired)".to_string(),
                Some(at) => format!(" (token valid for {}h)", (at - now) / 3600),
            };
            format!("connected as @{}{}", connection.username, expiry)
        }
        Some(_) => "disconnected".to_string(),
        None => "not connected".to_string(),
    }
}

async fn status(user: i64, format: &str) -> Result<()> {
    let service = open_service().await?;
    let statuses = service.connections().status(user).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    let now = chrono::Utc::now().timestamp();
    for status in &statuses {
        let symbol = if status.is_connected() { "✓" } else { "✗" };
        println!(
            "{} {:<10} {}",
            symbol,
            status.platform.display_name(),
            describe(status, now)
        );
    }
    Ok(())
}
