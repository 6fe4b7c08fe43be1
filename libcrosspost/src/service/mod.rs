//! Service layer for Crosspost
//!
//! `CrosspostService` wires configuration, the database, the credential
//! manager, the platform adapters and the dispatcher together so the
//! binaries (or an embedding application) deal with a single entry point.
//! Collaborators are built once and passed down explicitly; nothing here is
//! global.
//!
//! # Example
//!
//! ```no_run
//! use libcrosspost::service::CrosspostService;
//! use libcrosspost::types::{Post, PlatformKind};
//!
//! # async fn example() -> libcrosspost::Result<()> {
//! let service = CrosspostService::new().await?;
//!
//! let post = Post::new("user-1", "Hello world").with_hashtags(["rust"]);
//! let results = service.dispatch(&post, &[PlatformKind::Facebook, PlatformKind::Twitter]).await;
//! println!("{:?}", results);
//! # Ok(())
//! # }
//! ```

pub mod events;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use self::events::{EventBus, EventReceiver};
use crate::config::{resolve_db_path, Config};
use crate::credentials::CredentialManager;
use crate::db::Database;
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::{ConfigError, CrosspostError, Result};
use crate::graph::GraphClient;
use crate::platforms::facebook::FacebookPlatform;
use crate::platforms::instagram::InstagramPlatform;
use crate::platforms::simulated::SimulatedPlatform;
use crate::platforms::{MediaHost, ShareHandoff};
use crate::types::{CredentialRecord, PlatformKind, Post};

/// Host-application integrations the library cannot provide itself
#[derive(Default, Clone)]
pub struct ServiceHooks {
    /// Native share sheet for Facebook personal-timeline posts
    pub share_handoff: Option<Arc<dyn ShareHandoff>>,
    /// Publishes local files so Instagram can fetch them
    pub media_host: Option<Arc<dyn MediaHost>>,
}

/// Connection state of one platform for one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub platform: PlatformKind,
    /// An adapter is configured for this platform
    pub enabled: bool,
    pub connected: bool,
    pub expires_at: Option<i64>,
}

pub struct CrosspostService {
    config: Arc<Config>,
    db: Database,
    credentials: Arc<CredentialManager>,
    dispatcher: Dispatcher,
    event_bus: EventBus,
}

impl CrosspostService {
    /// Load configuration from the default location and build the service
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: Config) -> Result<Self> {
        Self::from_config_with(config, ServiceHooks::default()).await
    }

    /// Build the service with host-application hooks
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated, or an
    /// HTTP client cannot be built.
    pub async fn from_config_with(config: Config, hooks: ServiceHooks) -> Result<Self> {
        config.validate()?;

        let db_path = resolve_db_path(&config.database.path)?;
        let db_path_str = db_path.to_str().ok_or_else(|| {
            CrosspostError::Config(ConfigError::InvalidValue {
                field: "database.path".to_string(),
                reason: "path is not valid UTF-8".to_string(),
            })
        })?;
        let db = Database::new(db_path_str).await?;

        let mut manager = CredentialManager::new(Arc::new(db.clone()));
        if let Some(facebook) = &config.facebook {
            manager = manager.with_page_token_ttl_days(facebook.page_token_ttl_days);
        }
        let credentials = Arc::new(manager);

        let event_bus = EventBus::new(100);
        let mut dispatcher = Dispatcher::new(Arc::clone(&credentials))
            .with_database(db.clone())
            .with_event_bus(event_bus.clone())
            .with_concurrency(config.dispatch.concurrent);

        let timeout = config.http.timeout_secs.map(Duration::from_secs);

        if let Some(facebook) = config.facebook.as_ref().filter(|c| c.enabled) {
            let graph = GraphClient::new(&facebook.graph_url, &facebook.api_version, timeout)?;
            let mut platform = FacebookPlatform::new(graph, Arc::clone(&credentials));
            if let Some(share) = &hooks.share_handoff {
                platform = platform.with_share_handoff(Arc::clone(share));
            }
            dispatcher.register(Box::new(platform));
        }

        if let Some(instagram) = config.instagram.as_ref().filter(|c| c.enabled) {
            let graph = GraphClient::new(&instagram.graph_url, &instagram.api_version, timeout)?;
            let mut platform = InstagramPlatform::new(graph).with_polling(
                Duration::from_millis(instagram.publish_poll_interval_ms),
                instagram.publish_poll_attempts,
            );
            if let Some(host) = &hooks.media_host {
                platform = platform.with_media_host(Arc::clone(host));
            }
            dispatcher.register(Box::new(platform));
        }

        if let Some(simulated) = &config.simulated {
            for kind in &simulated.platforms {
                dispatcher.register(Box::new(SimulatedPlatform::from_config(*kind, simulated)));
            }
        }

        debug!(platforms = ?dispatcher.platforms(), "Registered platform adapters");

        Ok(Self {
            config: Arc::new(config),
            db,
            credentials,
            dispatcher,
            event_bus,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Subscribe to dispatch progress events
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Platforms used when a caller does not name any
    pub fn default_platforms(&self) -> &[PlatformKind] {
        &self.config.defaults.platforms
    }

    pub async fn dispatch(
        &self,
        post: &Post,
        platforms: &[PlatformKind],
    ) -> BTreeMap<PlatformKind, bool> {
        self.dispatcher.dispatch(post, platforms).await
    }

    pub async fn dispatch_detailed(&self, post: &Post, platforms: &[PlatformKind]) -> DispatchReport {
        self.dispatcher.dispatch_detailed(post, platforms).await
    }

    /// Verify a credential with its platform, then store it
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the platform has no configured adapter, or the
    /// platform error returned by verification.
    pub async fn connect(&self, record: &CredentialRecord) -> Result<()> {
        let adapter = self.dispatcher.adapter(record.platform).ok_or_else(|| {
            CrosspostError::InvalidInput(format!(
                "{} is not enabled in the configuration",
                record.platform
            ))
        })?;

        adapter.verify(record).await?;
        self.credentials.connect(record).await?;
        info!(user_id = %record.user_id, platform = %record.platform, "Connected platform");
        Ok(())
    }

    pub async fn disconnect(&self, user_id: &str, platform: PlatformKind) -> Result<bool> {
        self.credentials.disconnect(user_id, platform).await
    }

    /// Connection state for every supported platform
    pub async fn status(&self, user_id: &str) -> Result<Vec<ConnectionStatus>> {
        let mut statuses = Vec::with_capacity(PlatformKind::ALL.len());
        for platform in PlatformKind::ALL {
            let record = self.credentials.get_token(user_id, platform).await?;
            statuses.push(ConnectionStatus {
                platform,
                enabled: self.dispatcher.adapter(platform).is_some(),
                connected: record.as_ref().is_some_and(|r| !r.is_expired()),
                expires_at: record.and_then(|r| r.expires_at),
            });
        }
        Ok(statuses)
    }

    /// Most recent posts for a user
    pub async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<Post>> {
        self.db.list_posts(user_id, limit).await
    }
}
