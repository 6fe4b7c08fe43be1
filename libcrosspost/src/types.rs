//! Core types for Crosspost

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of platforms a post can be dispatched to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Facebook,
    Instagram,
    Youtube,
    Twitter,
    Tiktok,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 5] = [
        PlatformKind::Facebook,
        PlatformKind::Instagram,
        PlatformKind::Youtube,
        PlatformKind::Twitter,
        PlatformKind::Tiktok,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::Youtube => "youtube",
            Self::Twitter => "twitter",
            Self::Tiktok => "tiktok",
        }
    }

    /// Parse a comma-separated list such as `"facebook, x,tiktok"`
    pub fn parse_list(s: &str) -> Result<Vec<Self>, String> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "facebook" => Ok(Self::Facebook),
            "instagram" => Ok(Self::Instagram),
            "youtube" => Ok(Self::Youtube),
            "twitter" | "x" => Ok(Self::Twitter),
            "tiktok" => Ok(Self::Tiktok),
            _ => Err(format!(
                "Unknown platform: '{}'. Valid options: facebook, instagram, youtube, twitter, tiktok",
                s
            )),
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Where a media item lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A file on the local filesystem that must be uploaded
    LocalFile(PathBuf),
    /// A publicly reachable URL the platform can fetch itself
    Remote(String),
}

/// Broad media category, derived from the MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

/// A media item attached to a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Local path (optionally `file://`) or public `http(s)` URL
    pub uri: String,
    pub mime_type: String,
}

impl MediaRef {
    pub fn new(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn source(&self) -> MediaSource {
        let uri = self.uri.trim();
        let lower = uri.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            MediaSource::Remote(uri.to_string())
        } else if let Some(path) = uri.strip_prefix("file://") {
            MediaSource::LocalFile(PathBuf::from(path))
        } else {
            MediaSource::LocalFile(PathBuf::from(uri))
        }
    }

    pub fn kind(&self) -> MediaKind {
        let mime = self.mime_type.trim().to_lowercase();
        if mime.starts_with("image/") {
            MediaKind::Image
        } else if mime.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Other
        }
    }

    /// File name used for multipart uploads
    pub fn file_name(&self) -> String {
        match self.source() {
            MediaSource::LocalFile(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "upload".to_string()),
            MediaSource::Remote(url) => url
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or("upload")
                .to_string(),
        }
    }
}

/// Platform-specific posting options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformOptions {
    /// Post to a Facebook Page rather than the personal timeline
    #[serde(default)]
    pub post_as_page: bool,
    /// Target page; falls back to the page stored with the credential
    #[serde(default)]
    pub page_id: Option<String>,
    /// Unix timestamp for scheduled publication
    #[serde(default)]
    pub scheduled_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub hashtags: Vec<String>,
    pub media: Vec<MediaRef>,
    pub platform_options: HashMap<PlatformKind, PlatformOptions>,
    pub created_at: i64,
    pub status: PostStatus,
}

impl Post {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            content: content.into(),
            hashtags: Vec::new(),
            media: Vec::new(),
            platform_options: HashMap::new(),
            created_at: chrono::Utc::now().timestamp(),
            status: PostStatus::Pending,
        }
    }

    pub fn with_hashtags<I, S>(mut self, hashtags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hashtags = hashtags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media.push(media);
        self
    }

    pub fn with_options(mut self, platform: PlatformKind, options: PlatformOptions) -> Self {
        self.platform_options.insert(platform, options);
        self
    }

    /// Only the first media item is ever submitted
    pub fn first_media(&self) -> Option<&MediaRef> {
        self.media.first()
    }

    pub fn options_for(&self, platform: PlatformKind) -> Option<&PlatformOptions> {
        self.platform_options.get(&platform)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Posted => "posted",
            Self::Failed => "failed",
        }
    }

    /// Overall status for a dispatch: posted only if every platform succeeded
    pub fn from_results(results: &BTreeMap<PlatformKind, bool>) -> Self {
        if !results.is_empty() && results.values().all(|ok| *ok) {
            Self::Posted
        } else {
            Self::Failed
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "posted" => Ok(Self::Posted),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown post status: '{}'", other)),
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Outcome of one platform submission, as persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformRecord {
    pub id: Option<i64>,
    pub post_id: String,
    pub platform: PlatformKind,
    pub platform_post_id: Option<String>,
    pub posted_at: Option<i64>,
    pub success: bool,
    pub error_message: Option<String>,
}

/// One entry of a post's error log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub timestamp: i64,
    pub error: String,
}

/// Stored OAuth token set for one user on one platform
#[derive(Debug)]
pub struct CredentialRecord {
    pub user_id: String,
    pub platform: PlatformKind,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Absolute expiry (Unix seconds); `None` means no known expiry
    pub expires_at: Option<i64>,
    pub provider_user_id: String,
    /// Facebook page managed by this user
    pub page_id: Option<String>,
    /// Provider account id, e.g. the Instagram business account
    pub account_id: Option<String>,
    pub created_at: i64,
}

impl CredentialRecord {
    pub fn new(
        user_id: impl Into<String>,
        platform: PlatformKind,
        access_token: impl Into<String>,
        provider_user_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            platform,
            access_token: SecretString::from(access_token.into()),
            refresh_token: None,
            expires_at: None,
            provider_user_id: provider_user_id.into(),
            page_id: None,
            account_id: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Expiry relative to `created_at`, as returned by OAuth token endpoints
    pub fn with_expires_in(mut self, seconds: i64) -> Self {
        self.expires_at = Some(self.created_at + seconds);
        self
    }

    pub fn with_expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_page_id(mut self, page_id: impl Into<String>) -> Self {
        self.page_id = Some(page_id.into());
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    pub fn token(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl Clone for CredentialRecord {
    fn clone(&self) -> Self {
        Self {
            user_id: self.user_id.clone(),
            platform: self.platform,
            access_token: SecretString::from(self.access_token.expose_secret().to_string()),
            refresh_token: self
                .refresh_token
                .as_ref()
                .map(|t| SecretString::from(t.expose_secret().to_string())),
            expires_at: self.expires_at,
            provider_user_id: self.provider_user_id.clone(),
            page_id: self.page_id.clone(),
            account_id: self.account_id.clone(),
            created_at: self.created_at,
        }
    }
}

/// Cached page-scoped Facebook token
#[derive(Debug)]
pub struct PageToken {
    pub access_token: SecretString,
    pub expires_at: i64,
}

impl PageToken {
    pub fn new(access_token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            expires_at,
        }
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        self.expires_at > now
    }

    pub fn token(&self) -> &str {
        self.access_token.expose_secret()
    }
}
