//! xpost-post - Dispatch a post to several social platforms

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use libcrosspost::{
    logging, Config, CrosspostError, CrosspostService, MediaRef, PlatformKind, PlatformOptions,
    Post, PostStatus,
};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "xpost-post")]
#[command(version)]
#[command(about = "Post content to several social platforms at once", long_about = None)]
struct Cli {
    /// Content to post (reads from stdin if not provided)
    content: Option<String>,

    /// User whose credentials are used
    #[arg(short, long, env = "XPOST_USER", default_value = "default")]
    user: String,

    /// Target platform(s), comma-separated (defaults from config)
    #[arg(short, long)]
    platform: Option<String>,

    /// Hashtag to add (repeatable, leading '#' optional)
    #[arg(short = 't', long = "tag")]
    tags: Vec<String>,

    /// Local path or public URL of an image or video
    #[arg(short, long)]
    media: Option<String>,

    /// MIME type of --media (guessed from the extension if omitted)
    #[arg(long, requires = "media")]
    mime: Option<String>,

    /// Post to a Facebook Page instead of the personal timeline
    #[arg(long)]
    as_page: bool,

    /// Facebook Page id (defaults to the page stored with the credential)
    #[arg(long, requires = "as_page")]
    page_id: Option<String>,

    /// Schedule Facebook Page posts for this Unix timestamp
    #[arg(long, value_name = "UNIX_TS", requires = "as_page")]
    schedule: Option<i64>,

    /// Configuration file (defaults to $XPOST_CONFIG or the XDG location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init_default(cli.verbose) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    match run(cli).await {
        Ok(status) => {
            if status != PostStatus::Posted {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<CrosspostError>()
                .map(CrosspostError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> Result<PostStatus> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let service = CrosspostService::from_config(config).await?;

    let platforms = match &cli.platform {
        Some(list) => PlatformKind::parse_list(list).map_err(CrosspostError::InvalidInput)?,
        None => service.default_platforms().to_vec(),
    };
    if platforms.is_empty() {
        return Err(CrosspostError::InvalidInput(
            "no platforms given and no [defaults] platforms configured".to_string(),
        )
        .into());
    }

    let post = build_post(&cli)?;
    debug!(post_id = %post.id, platforms = ?platforms, "Built post");

    let report = service.dispatch_detailed(&post, &platforms).await;

    if cli.format == "json" {
        let results: Vec<_> = report
            .outcomes
            .values()
            .map(|o| {
                serde_json::json!({
                    "platform": o.platform,
                    "success": o.success,
                    "external_id": o.external_id,
                    "error": o.reason,
                })
            })
            .collect();
        let output = serde_json::json!({
            "post_id": report.post_id,
            "status": report.status,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for outcome in report.outcomes.values() {
            match (&outcome.external_id, &outcome.reason) {
                (Some(id), _) => println!("{}: {}", outcome.platform, id),
                (None, Some(reason)) => eprintln!("{}: failed: {}", outcome.platform, reason),
                (None, None) => eprintln!("{}: failed", outcome.platform),
            }
        }
        println!("{} {}", report.post_id, report.status);
    }

    Ok(report.status)
}

fn build_post(cli: &Cli) -> Result<Post> {
    let content = match &cli.content {
        Some(content) => content.clone(),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read content from stdin")?;
            buffer.trim_end().to_string()
        }
    };

    if content.trim().is_empty() && cli.tags.is_empty() && cli.media.is_none() {
        return Err(CrosspostError::InvalidInput("Nothing to post".to_string()).into());
    }

    let mut post = Post::new(cli.user.clone(), content).with_hashtags(cli.tags.iter().cloned());

    if let Some(uri) = &cli.media {
        let mime = match &cli.mime {
            Some(mime) => mime.clone(),
            None => match guess_mime(uri) {
                Some(mime) => mime.to_string(),
                None => bail!("Cannot guess the MIME type of {}; pass --mime", uri),
            },
        };
        post = post.with_media(MediaRef::new(uri.clone(), mime));
    }

    if cli.as_page {
        post = post.with_options(
            PlatformKind::Facebook,
            PlatformOptions {
                post_as_page: true,
                page_id: cli.page_id.clone(),
                scheduled_at: cli.schedule,
            },
        );
    }

    Ok(post)
}

fn guess_mime(uri: &str) -> Option<&'static str> {
    let path = uri.split(&['?', '#'][..]).next().unwrap_or(uri);
    let extension = path.rsplit('.').next()?.to_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "mp4" => Some("video/mp4"),
        "mov" => Some("video/quicktime"),
        "webm" => Some("video/webm"),
        _ => None,
    }
}
