//! Per-user platform credentials
//!
//! The storage layer is abstracted behind [`CredentialStore`] so the same
//! policy code runs against SQLite in production and memory in tests.
//! [`CredentialManager`] is the facade the rest of the crate talks to:
//!
//! - "is platform P connected for user U"
//! - token lookup for submissions
//! - the Facebook page-token cache (cache, then fetch, then store)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libcrosspost::credentials::{CredentialManager, MemoryCredentialStore};
//! use libcrosspost::types::{CredentialRecord, PlatformKind};
//!
//! # async fn example() -> libcrosspost::Result<()> {
//! let manager = CredentialManager::new(Arc::new(MemoryCredentialStore::new()));
//!
//! let record = CredentialRecord::new("user-1", PlatformKind::Facebook, "EAAB...", "fb-123")
//!     .with_expires_in(60 * 24 * 3600);
//! manager.connect(&record).await?;
//!
//! assert!(manager.is_connected("user-1", PlatformKind::Facebook).await?);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::error::{PlatformError, PlatformResult, Result};
use crate::types::{CredentialRecord, PageToken, PlatformKind};

/// Storage backend for credential records and cached page tokens
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or replace the record for `(record.user_id, record.platform)`
    async fn put(&self, record: &CredentialRecord) -> Result<()>;

    async fn get(&self, user_id: &str, platform: PlatformKind)
        -> Result<Option<CredentialRecord>>;

    /// Returns whether a record was removed
    async fn delete(&self, user_id: &str, platform: PlatformKind) -> Result<bool>;

    async fn list(&self, user_id: &str) -> Result<Vec<CredentialRecord>>;

    async fn get_page_token(&self, user_id: &str, page_id: &str) -> Result<Option<PageToken>>;

    async fn put_page_token(&self, user_id: &str, page_id: &str, token: &PageToken)
        -> Result<()>;

    /// Remove one cached page token, or all of them for the user when `page_id` is `None`
    async fn delete_page_tokens(&self, user_id: &str, page_id: Option<&str>) -> Result<()>;

    fn backend_name(&self) -> &str;
}

/// Exchanges a user token for a page-scoped token
#[async_trait]
pub trait PageTokenFetcher: Send + Sync {
    async fn fetch_page_token(
        &self,
        user_token: &str,
        page_id: &str,
    ) -> PlatformResult<String>;
}

const DEFAULT_PAGE_TOKEN_TTL_DAYS: i64 = 60;

/// Longest page-token cache lifetime accepted from configuration
pub const MAX_PAGE_TOKEN_TTL_DAYS: i64 = 3650;

/// Facade over a [`CredentialStore`]
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    page_token_ttl: chrono::Duration,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            page_token_ttl: chrono::Duration::days(DEFAULT_PAGE_TOKEN_TTL_DAYS),
        }
    }

    /// Cache lifetime for page tokens, clamped to `0..=MAX_PAGE_TOKEN_TTL_DAYS`
    pub fn with_page_token_ttl_days(mut self, days: i64) -> Self {
        let days = days.clamp(0, MAX_PAGE_TOKEN_TTL_DAYS);
        if let Some(ttl) = chrono::Duration::try_days(days) {
            self.page_token_ttl = ttl;
        }
        self
    }

    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }

    /// Record credentials after a successful authentication
    ///
    /// Replaces any previous record for the same user and platform.
    pub async fn connect(&self, record: &CredentialRecord) -> Result<()> {
        self.store.put(record).await?;
        info!(
            user_id = %record.user_id,
            platform = %record.platform,
            backend = self.store.backend_name(),
            "Stored credentials"
        );
        Ok(())
    }

    /// Forget a platform for a user
    ///
    /// Disconnecting Facebook also drops every cached page token.
    pub async fn disconnect(&self, user_id: &str, platform: PlatformKind) -> Result<bool> {
        let removed = self.store.delete(user_id, platform).await?;
        if platform == PlatformKind::Facebook {
            self.store.delete_page_tokens(user_id, None).await?;
        }
        info!(user_id, platform = %platform, removed, "Disconnected platform");
        Ok(removed)
    }

    /// A platform is connected when a record exists and has not expired
    pub async fn is_connected(&self, user_id: &str, platform: PlatformKind) -> Result<bool> {
        Ok(self
            .store
            .get(user_id, platform)
            .await?
            .is_some_and(|record| !record.is_expired()))
    }

    pub async fn get_token(
        &self,
        user_id: &str,
        platform: PlatformKind,
    ) -> Result<Option<CredentialRecord>> {
        self.store.get(user_id, platform).await
    }

    pub async fn connected_platforms(&self, user_id: &str) -> Result<Vec<PlatformKind>> {
        let mut platforms: Vec<PlatformKind> = self
            .store
            .list(user_id)
            .await?
            .into_iter()
            .filter(|record| !record.is_expired())
            .map(|record| record.platform)
            .collect();
        platforms.sort();
        Ok(platforms)
    }

    /// Replace the token fields of an existing record after a refresh
    pub async fn refresh(
        &self,
        user_id: &str,
        platform: PlatformKind,
        access_token: String,
        expires_at: Option<i64>,
        refresh_token: Option<String>,
    ) -> Result<()> {
        let mut record = self.store.get(user_id, platform).await?.ok_or_else(|| {
            PlatformError::NotConnected(format!("{} is not connected for user {}", platform, user_id))
        })?;

        record.access_token = SecretString::from(access_token);
        record.expires_at = expires_at;
        if let Some(refresh_token) = refresh_token {
            record.refresh_token = Some(SecretString::from(refresh_token));
        }

        self.store.put(&record).await?;
        debug!(user_id, platform = %platform, "Refreshed access token");
        Ok(())
    }

    /// Page-scoped token for a Facebook page
    ///
    /// Uses the cached token while it is inside its TTL; otherwise exchanges
    /// the user's Facebook token through `fetcher` and caches the result.
    /// Returns `None` when the user has no Facebook credentials.
    pub async fn get_page_access_token(
        &self,
        user_id: &str,
        page_id: &str,
        fetcher: &dyn PageTokenFetcher,
    ) -> Result<Option<String>> {
        let now = chrono::Utc::now().timestamp();

        if let Some(cached) = self.store.get_page_token(user_id, page_id).await? {
            if cached.is_valid_at(now) {
                debug!(user_id, page_id, "Page token cache hit");
                return Ok(Some(cached.token().to_string()));
            }
            debug!(user_id, page_id, "Cached page token expired");
        }

        let Some(user_record) = self.store.get(user_id, PlatformKind::Facebook).await? else {
            return Ok(None);
        };

        if user_record.is_expired_at(now) {
            return Err(PlatformError::TokenExpired(format!(
                "facebook token for user {} expired",
                user_id
            ))
            .into());
        }

        let fetched = fetcher
            .fetch_page_token(user_record.access_token.expose_secret(), page_id)
            .await?;

        let expires_at = now.saturating_add(self.page_token_ttl.num_seconds());
        let page_token = PageToken::new(fetched.clone(), expires_at);
        if let Err(e) = self.store.put_page_token(user_id, page_id, &page_token).await {
            warn!(user_id, page_id, "Failed to cache page token: {}", e);
        } else {
            debug!(user_id, page_id, expires_at, "Cached page token");
        }

        Ok(Some(fetched))
    }

    /// Drop a cached page token so the next lookup fetches a fresh one
    pub async fn invalidate_page_token(&self, user_id: &str, page_id: &str) -> Result<()> {
        self.store.delete_page_tokens(user_id, Some(page_id)).await
    }
}

/// In-process credential store
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<(String, PlatformKind), CredentialRecord>>,
    page_tokens: RwLock<HashMap<(String, String), (String, i64)>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn put(&self, record: &CredentialRecord) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert((record.user_id.clone(), record.platform), record.clone());
        Ok(())
    }

    async fn get(
        &self,
        user_id: &str,
        platform: PlatformKind,
    ) -> Result<Option<CredentialRecord>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(&(user_id.to_string(), platform)).cloned())
    }

    async fn delete(&self, user_id: &str, platform: PlatformKind) -> Result<bool> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        Ok(records.remove(&(user_id.to_string(), platform)).is_some())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<CredentialRecord>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_page_token(&self, user_id: &str, page_id: &str) -> Result<Option<PageToken>> {
        let tokens = self.page_tokens.read().unwrap_or_else(|e| e.into_inner());
        Ok(tokens
            .get(&(user_id.to_string(), page_id.to_string()))
            .map(|(token, expires_at)| PageToken::new(token.clone(), *expires_at)))
    }

    async fn put_page_token(
        &self,
        user_id: &str,
        page_id: &str,
        token: &PageToken,
    ) -> Result<()> {
        let mut tokens = self.page_tokens.write().unwrap_or_else(|e| e.into_inner());
        tokens.insert(
            (user_id.to_string(), page_id.to_string()),
            (token.token().to_string(), token.expires_at),
        );
        Ok(())
    }

    async fn delete_page_tokens(&self, user_id: &str, page_id: Option<&str>) -> Result<()> {
        let mut tokens = self.page_tokens.write().unwrap_or_else(|e| e.into_inner());
        tokens.retain(|(user, page), _| {
            user != user_id || page_id.is_some_and(|target| target != page)
        });
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
