//! Multi-platform post dispatch
//!
//! A dispatch runs in four stages:
//!
//! 1. pre-flight: every requested platform must have an adapter and a live
//!    credential, otherwise it fails immediately and is never submitted
//! 2. per-platform rendering through [`format_for`]
//! 3. submission through each platform's adapter, one after another by
//!    default or concurrently when enabled
//! 4. aggregation and persistence of per-platform outcomes
//!
//! `dispatch` never returns an error. Every failure becomes a `false` entry
//! with a reason; persistence problems are logged and otherwise ignored.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::credentials::CredentialManager;
use crate::db::Database;
use crate::error::{PlatformError, PlatformResult};
use crate::formatting::format_for;
use crate::platforms::{Platform, SubmitRequest};
use crate::service::events::{Event, EventBus};
use crate::types::{ErrorLogEntry, PlatformKind, PlatformRecord, Post, PostStatus};

/// Result of one platform within a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformOutcome {
    pub platform: PlatformKind,
    pub success: bool,
    /// Platform-specific post id (if successful)
    pub external_id: Option<String>,
    /// Human-readable failure reason (if failed)
    pub reason: Option<String>,
}

impl PlatformOutcome {
    fn succeeded(platform: PlatformKind, external_id: String) -> Self {
        Self {
            platform,
            success: true,
            external_id: Some(external_id),
            reason: None,
        }
    }

    fn failed(platform: PlatformKind, reason: String) -> Self {
        Self {
            platform,
            success: false,
            external_id: None,
            reason: Some(reason),
        }
    }
}

/// Everything a dispatch produced
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub post_id: String,
    pub outcomes: BTreeMap<PlatformKind, PlatformOutcome>,
    /// `Posted` only when every entry succeeded
    pub status: PostStatus,
}

impl DispatchReport {
    /// The plain platform -> success map
    pub fn results(&self) -> BTreeMap<PlatformKind, bool> {
        self.outcomes
            .iter()
            .map(|(platform, outcome)| (*platform, outcome.success))
            .collect()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &PlatformOutcome> {
        self.outcomes.values().filter(|o| o.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &PlatformOutcome> {
        self.outcomes.values().filter(|o| !o.success)
    }
}

pub struct Dispatcher {
    adapters: BTreeMap<PlatformKind, Box<dyn Platform>>,
    credentials: Arc<CredentialManager>,
    db: Option<Database>,
    events: EventBus,
    concurrent: bool,
}

impl Dispatcher {
    pub fn new(credentials: Arc<CredentialManager>) -> Self {
        Self {
            adapters: BTreeMap::new(),
            credentials,
            db: None,
            events: EventBus::default(),
            concurrent: false,
        }
    }

    /// Bind an adapter to its platform, replacing any previous one
    pub fn register(&mut self, platform: Box<dyn Platform>) {
        self.adapters.insert(platform.kind(), platform);
    }

    pub fn with_platform(mut self, platform: Box<dyn Platform>) -> Self {
        self.register(platform);
        self
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    /// Platforms with a registered adapter
    pub fn platforms(&self) -> Vec<PlatformKind> {
        self.adapters.keys().copied().collect()
    }

    pub fn adapter(&self, platform: PlatformKind) -> Option<&dyn Platform> {
        self.adapters.get(&platform).map(|p| p.as_ref())
    }

    /// Submit `post` to every platform in `platforms`
    ///
    /// The returned map has exactly one entry per distinct requested platform.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use libcrosspost::credentials::{CredentialManager, MemoryCredentialStore};
    /// use libcrosspost::dispatcher::Dispatcher;
    /// use libcrosspost::platforms::mock::MockPlatform;
    /// use libcrosspost::types::{Post, PlatformKind};
    ///
    /// # async fn example() {
    /// let credentials = Arc::new(CredentialManager::new(Arc::new(MemoryCredentialStore::new())));
    /// let dispatcher = Dispatcher::new(credentials)
    ///     .with_platform(Box::new(MockPlatform::success(PlatformKind::Twitter)));
    ///
    /// let post = Post::new("user-1", "Hello world").with_hashtags(["dart", "flutter"]);
    /// let results = dispatcher.dispatch(&post, &[PlatformKind::Twitter]).await;
    /// for (platform, ok) in results {
    ///     println!("{}: {}", platform, ok);
    /// }
    /// # }
    /// ```
    pub async fn dispatch(
        &self,
        post: &Post,
        platforms: &[PlatformKind],
    ) -> BTreeMap<PlatformKind, bool> {
        self.dispatch_detailed(post, platforms).await.results()
    }

    /// Like [`dispatch`](Self::dispatch), keeping external ids and failure reasons
    pub async fn dispatch_detailed(&self, post: &Post, platforms: &[PlatformKind]) -> DispatchReport {
        let mut requested: Vec<PlatformKind> = Vec::with_capacity(platforms.len());
        for platform in platforms {
            if !requested.contains(platform) {
                requested.push(*platform);
            }
        }

        info!(
            post_id = %post.id,
            user_id = %post.user_id,
            platforms = ?requested,
            "Dispatching post"
        );
        self.events.emit(Event::DispatchStarted {
            post_id: post.id.clone(),
            platforms: requested.clone(),
        });

        if let Some(db) = &self.db {
            if let Err(e) = db.create_post(post).await {
                warn!(post_id = %post.id, "Failed to create post record in database: {}", e);
            }
        }

        let mut outcomes = BTreeMap::new();
        let mut active = Vec::new();

        for platform in requested {
            match self.preflight(post, platform).await {
                Ok((adapter, request)) => active.push((adapter, request)),
                Err(reason) => {
                    warn!(post_id = %post.id, platform = %platform, reason = %reason, "Skipping platform");
                    self.events.emit(Event::PlatformSkipped {
                        post_id: post.id.clone(),
                        platform,
                        reason: reason.clone(),
                    });
                    outcomes.insert(platform, PlatformOutcome::failed(platform, reason));
                }
            }
        }

        for (platform, result) in self.submit_all(active).await {
            let outcome = match result {
                Ok(external_id) => {
                    info!(post_id = %post.id, platform = %platform, external_id = %external_id, "Submitted");
                    self.events.emit(Event::PlatformSucceeded {
                        post_id: post.id.clone(),
                        platform,
                        external_id: external_id.clone(),
                    });
                    PlatformOutcome::succeeded(platform, external_id)
                }
                Err(e) => {
                    let reason = e.to_string();
                    warn!(post_id = %post.id, platform = %platform, "Submission failed: {}", reason);
                    self.events.emit(Event::PlatformFailed {
                        post_id: post.id.clone(),
                        platform,
                        error: reason.clone(),
                    });
                    PlatformOutcome::failed(platform, reason)
                }
            };
            outcomes.insert(platform, outcome);
        }

        let report = DispatchReport {
            post_id: post.id.clone(),
            status: status_of(&outcomes),
            outcomes,
        };

        self.record_results(&report).await;

        let succeeded = report.succeeded().count();
        let failed = report.outcomes.len() - succeeded;
        info!(post_id = %post.id, status = %report.status, succeeded, failed, "Dispatch complete");
        self.events.emit(Event::DispatchCompleted {
            post_id: post.id.clone(),
            status: report.status,
            succeeded,
            failed,
        });

        report
    }

    /// Build the submission for one platform, or the reason it cannot be made
    async fn preflight(
        &self,
        post: &Post,
        platform: PlatformKind,
    ) -> Result<(&dyn Platform, SubmitRequest), String> {
        let adapter = self
            .adapter(platform)
            .ok_or_else(|| format!("no adapter registered for {}", platform))?;

        let credential = match self.credentials.get_token(&post.user_id, platform).await {
            Ok(Some(record)) if record.is_expired() => {
                return Err(PlatformError::TokenExpired(format!("{} token expired", platform)).to_string())
            }
            Ok(Some(record)) => record,
            Ok(None) => {
                return Err(PlatformError::NotConnected(format!("{} is not connected", platform)).to_string())
            }
            Err(e) => return Err(format!("credential lookup failed: {}", e)),
        };

        let request = SubmitRequest {
            post_id: post.id.clone(),
            text: format_for(platform, &post.content, &post.hashtags),
            media: post.first_media().cloned(),
            options: post.options_for(platform).cloned().unwrap_or_default(),
            credential,
        };

        Ok((adapter, request))
    }

    async fn submit_all(
        &self,
        active: Vec<(&dyn Platform, SubmitRequest)>,
    ) -> Vec<(PlatformKind, PlatformResult<String>)> {
        let submissions = active.into_iter().map(|(adapter, request)| async move {
            info!(post_id = %request.post_id, platform = %adapter.kind(), "Submitting");
            (adapter.kind(), adapter.submit(&request).await)
        });

        if self.concurrent {
            join_all(submissions).await
        } else {
            let mut results = Vec::new();
            for submission in submissions {
                results.push(submission.await);
            }
            results
        }
    }

    async fn record_results(&self, report: &DispatchReport) {
        let Some(db) = &self.db else {
            return;
        };
        let now = chrono::Utc::now().timestamp();

        for outcome in report.outcomes.values() {
            let record = PlatformRecord {
                id: None,
                post_id: report.post_id.clone(),
                platform: outcome.platform,
                platform_post_id: outcome.external_id.clone(),
                posted_at: outcome.success.then_some(now),
                success: outcome.success,
                error_message: outcome.reason.clone(),
            };
            if let Err(e) = db.create_post_record(&record).await {
                warn!(platform = %outcome.platform, "Failed to record result: {}", e);
            }

            if let Some(external_id) = &outcome.external_id {
                if let Err(e) = db
                    .set_platform_post_id(&report.post_id, outcome.platform, external_id)
                    .await
                {
                    warn!(platform = %outcome.platform, "Failed to store external id: {}", e);
                }
            }

            if let Some(reason) = &outcome.reason {
                let entry = ErrorLogEntry {
                    timestamp: now,
                    error: format!("{}: {}", outcome.platform, reason),
                };
                if let Err(e) = db.append_error_log(&report.post_id, &entry).await {
                    warn!(platform = %outcome.platform, "Failed to append error log: {}", e);
                }
            }
        }

        if report.outcomes.is_empty() {
            let entry = ErrorLogEntry {
                timestamp: now,
                error: "no platforms requested".to_string(),
            };
            if let Err(e) = db.append_error_log(&report.post_id, &entry).await {
                warn!("Failed to append error log: {}", e);
            }
        }

        if let Err(e) = db.update_post_status(&report.post_id, report.status).await {
            warn!(post_id = %report.post_id, "Failed to update post status: {}", e);
        }
    }
}

fn status_of(outcomes: &BTreeMap<PlatformKind, PlatformOutcome>) -> PostStatus {
    let results: BTreeMap<PlatformKind, bool> =
        outcomes.iter().map(|(p, o)| (*p, o.success)).collect();
    PostStatus::from_results(&results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::platforms::mock::MockPlatform;
    use crate::types::CredentialRecord;

    async fn connected(platforms: &[PlatformKind]) -> Arc<CredentialManager> {
        let manager = CredentialManager::new(Arc::new(MemoryCredentialStore::new()));
        for platform in platforms {
            manager
                .connect(&CredentialRecord::new("alice", *platform, "tok", "provider"))
                .await
                .unwrap();
        }
        Arc::new(manager)
    }

    #[tokio::test]
    async fn test_twitter_scenario() {
        let twitter = MockPlatform::success(PlatformKind::Twitter);
        let dispatcher = Dispatcher::new(connected(&[PlatformKind::Twitter]).await)
            .with_platform(Box::new(twitter.clone()));

        let post = Post::new("alice", "Hello world").with_hashtags(["dart", "flutter"]);
        let results = dispatcher.dispatch(&post, &[PlatformKind::Twitter]).await;

        assert_eq!(results, BTreeMap::from([(PlatformKind::Twitter, true)]));
        assert_eq!(twitter.submitted_text(), vec!["Hello world #dart #flutter"]);
    }

    #[tokio::test]
    async fn test_unconnected_platform_is_never_submitted() {
        let facebook = MockPlatform::success(PlatformKind::Facebook);
        let instagram = MockPlatform::success(PlatformKind::Instagram);
        let dispatcher = Dispatcher::new(connected(&[PlatformKind::Facebook]).await)
            .with_platform(Box::new(facebook.clone()))
            .with_platform(Box::new(instagram.clone()));

        let post = Post::new("alice", "Hi");
        let report = dispatcher
            .dispatch_detailed(&post, &[PlatformKind::Facebook, PlatformKind::Instagram])
            .await;

        assert!(report.outcomes[&PlatformKind::Facebook].success);
        let ig = &report.outcomes[&PlatformKind::Instagram];
        assert!(!ig.success);
        assert!(ig.reason.as_deref().unwrap().contains("Authentication required"));
        assert_eq!(instagram.submit_call_count(), 0);
        assert_eq!(facebook.submit_call_count(), 1);
        assert_eq!(report.status, PostStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_adapter_fails_that_platform() {
        let dispatcher = Dispatcher::new(connected(&[PlatformKind::Youtube]).await);
        let report = dispatcher
            .dispatch_detailed(&Post::new("alice", "Hi"), &[PlatformKind::Youtube])
            .await;
        let outcome = &report.outcomes[&PlatformKind::Youtube];
        assert!(!outcome.success);
        assert!(outcome.reason.as_deref().unwrap().contains("no adapter"));
    }

    #[tokio::test]
    async fn test_expired_credential_fails_preflight() {
        let manager = CredentialManager::new(Arc::new(MemoryCredentialStore::new()));
        manager
            .connect(
                &CredentialRecord::new("alice", PlatformKind::Tiktok, "tok", "tt").with_expires_at(1),
            )
            .await
            .unwrap();
        let tiktok = MockPlatform::success(PlatformKind::Tiktok);
        let dispatcher =
            Dispatcher::new(Arc::new(manager)).with_platform(Box::new(tiktok.clone()));

        let report = dispatcher
            .dispatch_detailed(&Post::new("alice", "Hi"), &[PlatformKind::Tiktok])
            .await;
        assert!(report.outcomes[&PlatformKind::Tiktok]
            .reason
            .as_deref()
            .unwrap()
            .contains("Token expired"));
        assert_eq!(tiktok.submit_call_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicates_collapse_and_empty_request_fails() {
        let youtube = MockPlatform::success(PlatformKind::Youtube);
        let dispatcher = Dispatcher::new(connected(&[PlatformKind::Youtube]).await)
            .with_platform(Box::new(youtube.clone()));
        let post = Post::new("alice", "Hi");

        let results = dispatcher
            .dispatch(&post, &[PlatformKind::Youtube, PlatformKind::Youtube])
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(youtube.submit_call_count(), 1);

        let empty = dispatcher.dispatch_detailed(&post, &[]).await;
        assert!(empty.outcomes.is_empty());
        assert_eq!(empty.status, PostStatus::Failed);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_others() {
        let all = [PlatformKind::Facebook, PlatformKind::Twitter, PlatformKind::Tiktok];
        for concurrent in [false, true] {
            let twitter = MockPlatform::success(PlatformKind::Twitter);
            let tiktok = MockPlatform::success(PlatformKind::Tiktok);
            let dispatcher = Dispatcher::new(connected(&all).await)
                .with_concurrency(concurrent)
                .with_platform(Box::new(MockPlatform::submit_failure(
                    PlatformKind::Facebook,
                    PlatformError::from_graph_code(1, "Application request limit reached"),
                )))
                .with_platform(Box::new(twitter.clone()))
                .with_platform(Box::new(tiktok.clone()));

            let report = dispatcher.dispatch_detailed(&Post::new("alice", "Hi"), &all).await;

            let facebook = &report.outcomes[&PlatformKind::Facebook];
            assert!(!facebook.success);
            assert!(facebook.reason.as_deref().unwrap().starts_with("Rate limited"));
            assert!(report.outcomes[&PlatformKind::Twitter].success);
            assert!(report.outcomes[&PlatformKind::Tiktok].success);
            assert_eq!(report.status, PostStatus::Failed);
        }
    }

    #[tokio::test]
    async fn test_per_platform_options_and_first_media() {
        use crate::types::{MediaRef, PlatformOptions};

        let facebook = MockPlatform::success(PlatformKind::Facebook);
        let dispatcher = Dispatcher::new(connected(&[PlatformKind::Facebook]).await)
            .with_platform(Box::new(facebook.clone()));

        let post = Post::new("alice", "Hi")
            .with_media(MediaRef::new("https://cdn.example.com/1.jpg", "image/jpeg"))
            .with_media(MediaRef::new("https://cdn.example.com/2.jpg", "image/jpeg"))
            .with_options(
                PlatformKind::Facebook,
                PlatformOptions {
                    post_as_page: true,
                    page_id: Some("page-1".to_string()),
                    scheduled_at: Some(1_900_000_000),
                },
            );
        dispatcher.dispatch(&post, &[PlatformKind::Facebook]).await;

        let submitted = facebook.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].media.as_ref().unwrap().uri, "https://cdn.example.com/1.jpg");
        assert!(submitted[0].options.post_as_page);
        assert_eq!(submitted[0].options.scheduled_at, Some(1_900_000_000));
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();
        let dispatcher = Dispatcher::new(connected(&[PlatformKind::Twitter]).await)
            .with_event_bus(bus)
            .with_platform(Box::new(MockPlatform::success(PlatformKind::Twitter)));

        let post = Post::new("alice", "Hi");
        dispatcher
            .dispatch(&post, &[PlatformKind::Twitter, PlatformKind::Instagram])
            .await;

        assert!(matches!(receiver.recv().await.unwrap(), Event::DispatchStarted { .. }));
        assert!(matches!(
            receiver.recv().await.unwrap(),
            Event::PlatformSkipped { platform: PlatformKind::Instagram, .. }
        ));
        assert!(matches!(
            receiver.recv().await.unwrap(),
            Event::PlatformSucceeded { platform: PlatformKind::Twitter, .. }
        ));
        assert!(matches!(
            receiver.recv().await.unwrap(),
            Event::DispatchCompleted { succeeded: 1, failed: 1, .. }
        ));
    }
}
