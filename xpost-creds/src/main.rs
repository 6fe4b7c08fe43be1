//! xpost-creds - Manage per-user platform credentials for Crosspost
//!
//! Tokens come from an OAuth flow run elsewhere; this tool verifies them
//! with the platform and stores them.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use libcrosspost::{logging, Config, CredentialRecord, CrosspostError, CrosspostService, PlatformKind};
use tracing::info;

#[derive(Parser)]
#[command(name = "xpost-creds")]
#[command(version)]
#[command(about = "Manage Crosspost platform credentials", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// User the credentials belong to
    #[arg(short, long, global = true, env = "XPOST_USER", default_value = "default")]
    user: String,

    /// Configuration file (defaults to $XPOST_CONFIG or the XDG location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify and store an access token for a platform
    Connect {
        /// Platform name (facebook, instagram, youtube, twitter, tiktok)
        platform: PlatformKind,

        /// Access token (prefer --stdin to keep it out of shell history)
        #[arg(long, env = "XPOST_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Read the access token from stdin
        #[arg(long, conflicts_with = "token")]
        stdin: bool,

        /// The user's id at the provider
        #[arg(long)]
        provider_user_id: String,

        /// Token lifetime in seconds, as returned by the token endpoint
        #[arg(long, conflicts_with = "expires_at")]
        expires_in: Option<i64>,

        /// Absolute token expiry (Unix timestamp)
        #[arg(long)]
        expires_at: Option<i64>,

        #[arg(long)]
        refresh_token: Option<String>,

        /// Facebook Page managed by this user
        #[arg(long)]
        page_id: Option<String>,

        /// Provider account id (the Instagram business account id)
        #[arg(long)]
        account_id: Option<String>,

        /// Store without asking the platform to verify the token
        #[arg(long)]
        no_verify: bool,
    },

    /// Replace the access token of an existing connection
    Refresh {
        platform: PlatformKind,

        #[arg(long, env = "XPOST_TOKEN", hide_env_values = true)]
        token: Option<String>,

        #[arg(long, conflicts_with = "token")]
        stdin: bool,

        #[arg(long)]
        expires_at: Option<i64>,

        #[arg(long)]
        refresh_token: Option<String>,
    },

    /// Forget the credentials for a platform
    Disconnect { platform: PlatformKind },

    /// Show which platforms are connected
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init_default(cli.verbose) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<CrosspostError>()
            .map(CrosspostError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let service = CrosspostService::from_config(config).await?;
    let user = cli.user.as_str();

    match cli.command {
        Commands::Connect {
            platform,
            token,
            stdin,
            provider_user_id,
            expires_in,
            expires_at,
            refresh_token,
            page_id,
            account_id,
            no_verify,
        } => {
            let token = read_token(token, stdin)?;
            let mut record = CredentialRecord::new(user, platform, token, provider_user_id);
            if let Some(seconds) = expires_in {
                record = record.with_expires_in(seconds);
            }
            if let Some(at) = expires_at {
                record = record.with_expires_at(at);
            }
            if let Some(refresh) = refresh_token {
                record = record.with_refresh_token(refresh);
            }
            if let Some(page_id) = page_id {
                record = record.with_page_id(page_id);
            }
            if let Some(account_id) = account_id {
                record = record.with_account_id(account_id);
            }

            if no_verify {
                service.credentials().connect(&record).await?;
            } else {
                service.connect(&record).await?;
            }
            println!("✓ Connected {} for {}", platform, user);
        }
        Commands::Refresh {
            platform,
            token,
            stdin,
            expires_at,
            refresh_token,
        } => {
            let token = read_token(token, stdin)?;
            service
                .credentials()
                .refresh(user, platform, token, expires_at, refresh_token)
                .await?;
            println!("✓ Refreshed {} for {}", platform, user);
        }
        Commands::Disconnect { platform } => {
            if service.disconnect(user, platform).await? {
                println!("✓ Disconnected {} for {}", platform, user);
            } else {
                println!("{} was not connected for {}", platform, user);
            }
        }
        Commands::Status => {
            info!(user, backend = service.credentials().backend_name(), "Listing credentials");
            for status in service.status(user).await? {
                let state = if status.connected {
                    "connected"
                } else if status.expires_at.is_some() {
                    "expired"
                } else {
                    "not connected"
                };
                let expiry = status
                    .expires_at
                    .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                    .map(|dt| format!(" (expires {})", dt.format("%Y-%m-%d %H:%M UTC")))
                    .unwrap_or_default();
                let enabled = if status.enabled { "" } else { " [not enabled]" };
                println!("{:<10} {}{}{}", status.platform, state, expiry, enabled);
            }
        }
    }

    Ok(())
}

fn read_token(token: Option<String>, stdin: bool) -> Result<String> {
    let token = if stdin {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read token from stdin")?;
        buffer
    } else {
        match token {
            Some(token) => token,
            None => bail!("Provide the access token with --token, XPOST_TOKEN or --stdin"),
        }
    };

    let token = token.trim().to_string();
    if token.is_empty() {
        bail!("Access token is empty");
    }
    Ok(token)
}
