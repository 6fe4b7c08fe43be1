//! End-to-end dispatch workflows
//!
//! These tests run the dispatcher against a real SQLite database and
//! verify complete workflows including:
//! - Single-platform posts with hashtag formatting
//! - Mixed outcomes where one platform is not connected
//! - Instagram rejecting text-only posts before any network call
//! - What ends up persisted on the post afterwards

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use libcrosspost::credentials::CredentialManager;
use libcrosspost::db::Database;
use libcrosspost::dispatcher::Dispatcher;
use libcrosspost::error::PlatformError;
use libcrosspost::graph::GraphClient;
use libcrosspost::platforms::instagram::InstagramPlatform;
use libcrosspost::platforms::mock::MockPlatform;
use libcrosspost::platforms::simulated::SimulatedPlatform;
use libcrosspost::service::events::Event;
use libcrosspost::service::events::EventBus;
use libcrosspost::types::{CredentialRecord, PlatformKind, Post, PostStatus};

/// Helper to create a test database
async fn create_test_db() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let db_path_str = db_path.to_string_lossy().to_string();

    let db = Database::new(&db_path_str).await?;
    Ok((temp_dir, db))
}

/// Credential manager backed by the same database as the posts
async fn connect_platforms(db: &Database, user: &str, platforms: &[PlatformKind]) -> Result<Arc<CredentialManager>> {
    let manager = Arc::new(CredentialManager::new(Arc::new(db.clone())));
    for platform in platforms {
        let record = CredentialRecord::new(user, *platform, format!("{}-token", platform), "provider-id")
            .with_account_id("17841400000000000");
        manager.connect(&record).await?;
    }
    Ok(manager)
}

#[tokio::test]
async fn test_twitter_post_with_hashtags() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let credentials = connect_platforms(&db, "alice", &[PlatformKind::Twitter]).await?;

    let twitter = MockPlatform::success(PlatformKind::Twitter);
    let dispatcher = Dispatcher::new(credentials)
        .with_database(db.clone())
        .with_platform(Box::new(twitter.clone()));

    let post = Post::new("alice", "Hello world").with_hashtags(["dart", "flutter"]);
    let results = dispatcher.dispatch(&post, &[PlatformKind::Twitter]).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[&PlatformKind::Twitter], true);
    assert_eq!(twitter.submitted_text(), vec!["Hello world #dart #flutter"]);

    let stored = db.get_post(&post.id).await?.expect("post should be stored");
    assert_eq!(stored.status, PostStatus::Posted);
    assert_eq!(stored.content, "Hello world");
    assert_eq!(stored.hashtags, vec!["dart", "flutter"]);

    let ids = db.get_platform_post_ids(&post.id).await?;
    assert!(ids[&PlatformKind::Twitter].starts_with("twitter:mock-"));
    assert!(db.get_error_log(&post.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_instagram_without_media_fails_without_network() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let credentials = connect_platforms(&db, "alice", &[PlatformKind::Instagram]).await?;

    // Nothing listens on the discard port; reaching the network would fail differently
    let graph = GraphClient::new("http://127.0.0.1:9", "v19.0", Some(Duration::from_secs(1)))?;
    let dispatcher = Dispatcher::new(credentials)
        .with_database(db.clone())
        .with_platform(Box::new(InstagramPlatform::new(graph)));

    let post = Post::new("alice", "Text only");
    let results = dispatcher.dispatch(&post, &[PlatformKind::Instagram]).await;

    assert_eq!(results[&PlatformKind::Instagram], false);

    let stored = db.get_post(&post.id).await?.expect("post should be stored");
    assert_eq!(stored.status, PostStatus::Failed);

    let log = db.get_error_log(&post.id).await?;
    assert_eq!(log.len(), 1);
    assert!(log[0].error.starts_with("instagram: "));
    assert!(log[0].error.contains("Instagram requires media content"));
    Ok(())
}

#[tokio::test]
async fn test_partial_success_when_one_platform_not_connected() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let credentials = connect_platforms(&db, "alice", &[PlatformKind::Facebook]).await?;

    let facebook = MockPlatform::success(PlatformKind::Facebook);
    let instagram = MockPlatform::success(PlatformKind::Instagram);
    let dispatcher = Dispatcher::new(credentials)
        .with_database(db.clone())
        .with_platform(Box::new(facebook.clone()))
        .with_platform(Box::new(instagram.clone()));

    let post = Post::new("alice", "Hi");
    let report = dispatcher
        .dispatch_detailed(&post, &[PlatformKind::Facebook, PlatformKind::Instagram])
        .await;

    assert_eq!(report.results()[&PlatformKind::Facebook], true);
    assert_eq!(report.results()[&PlatformKind::Instagram], false);
    assert_eq!(report.status, PostStatus::Failed);

    // The unconnected platform never reaches its adapter
    assert_eq!(facebook.submit_call_count(), 1);
    assert_eq!(instagram.submit_call_count(), 0);

    let records = db.get_post_records(&post.id).await?;
    assert_eq!(records.len(), 2);
    let failed = records
        .iter()
        .find(|r| r.platform == PlatformKind::Instagram)
        .expect("instagram record");
    assert!(!failed.success);
    assert!(failed
        .error_message
        .as_deref()
        .unwrap()
        .contains("instagram is not connected"));

    let ids = db.get_platform_post_ids(&post.id).await?;
    assert_eq!(ids.len(), 1);
    assert!(ids.contains_key(&PlatformKind::Facebook));

    let stored = db.get_post(&post.id).await?.expect("post should be stored");
    assert_eq!(stored.status, PostStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_every_platform_failing_marks_post_failed() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let credentials = connect_platforms(&db, "alice", &[PlatformKind::Youtube, PlatformKind::Tiktok]).await?;

    let dispatcher = Dispatcher::new(credentials)
        .with_database(db.clone())
        .with_platform(Box::new(MockPlatform::submit_failure(
            PlatformKind::Youtube,
            PlatformError::RateLimited("quota exhausted".to_string()),
        )))
        .with_platform(Box::new(MockPlatform::submit_failure(
            PlatformKind::Tiktok,
            PlatformError::Network("connection reset".to_string()),
        )));

    let post = Post::new("alice", "Nobody will see this");
    let report = dispatcher
        .dispatch_detailed(&post, &[PlatformKind::Youtube, PlatformKind::Tiktok])
        .await;

    assert_eq!(report.status, PostStatus::Failed);
    assert_eq!(report.failed().count(), 2);

    let log = db.get_error_log(&post.id).await?;
    assert_eq!(log.len(), 2);
    assert!(log.iter().any(|e| e.error == "youtube: Rate limited, try again later: quota exhausted"));
    assert!(log.iter().any(|e| e.error == "tiktok: Network error: connection reset"));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_dispatch_with_simulated_platforms() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let platforms = [PlatformKind::Youtube, PlatformKind::Twitter, PlatformKind::Tiktok];
    let credentials = connect_platforms(&db, "alice", &platforms).await?;

    let mut dispatcher = Dispatcher::new(credentials)
        .with_database(db.clone())
        .with_concurrency(true);
    for kind in platforms {
        dispatcher.register(Box::new(SimulatedPlatform::new(kind, Duration::from_millis(5), 0.0)));
    }

    let post = Post::new("alice", "Everywhere at once").with_hashtags(["launch"]);
    let report = dispatcher.dispatch_detailed(&post, &platforms).await;

    assert_eq!(report.status, PostStatus::Posted);
    let ids = db.get_platform_post_ids(&post.id).await?;
    for kind in platforms {
        assert!(ids[&kind].starts_with(&format!("{}_", kind)));
    }
    Ok(())
}

#[tokio::test]
async fn test_events_follow_dispatch() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let credentials = connect_platforms(&db, "alice", &[PlatformKind::Twitter]).await?;

    let events = EventBus::new(16);
    let mut receiver = events.subscribe();
    let dispatcher = Dispatcher::new(credentials)
        .with_database(db)
        .with_event_bus(events)
        .with_platform(Box::new(MockPlatform::success(PlatformKind::Twitter)));

    let post = Post::new("alice", "Watch me");
    dispatcher
        .dispatch(&post, &[PlatformKind::Twitter, PlatformKind::Tiktok])
        .await;

    let mut seen = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        seen.push(event);
    }

    assert!(matches!(seen.first(), Some(Event::DispatchStarted { .. })));
    assert!(seen
        .iter()
        .any(|e| matches!(e, Event::PlatformSkipped { platform, .. } if *platform == PlatformKind::Tiktok)));
    assert!(seen
        .iter()
        .any(|e| matches!(e, Event::PlatformSucceeded { platform, .. } if *platform == PlatformKind::Twitter)));
    match seen.last() {
        Some(Event::DispatchCompleted { status, succeeded, failed, .. }) => {
            assert_eq!(*status, PostStatus::Failed);
            assert_eq!(*succeeded, 1);
            assert_eq!(*failed, 1);
        }
        other => panic!("expected DispatchCompleted last, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_history_after_posting() -> Result<()> {
    let (_temp_dir, db) = create_test_db().await?;
    let credentials = connect_platforms(&db, "alice", &[PlatformKind::Twitter]).await?;
    let dispatcher = Dispatcher::new(credentials)
        .with_database(db.clone())
        .with_platform(Box::new(MockPlatform::success(PlatformKind::Twitter)));

    for i in 0..3 {
        let post = Post::new("alice", format!("Post {}", i));
        dispatcher.dispatch(&post, &[PlatformKind::Twitter]).await;
    }
    dispatcher
        .dispatch(&Post::new("bob", "Not alice's"), &[PlatformKind::Twitter])
        .await;

    let history = db.list_posts("alice", 10).await?;
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|p| p.user_id == "alice"));
    assert!(history.iter().all(|p| p.status == PostStatus::Posted));

    // bob has no credentials, so his post fails
    let bob = db.list_posts("bob", 10).await?;
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].status, PostStatus::Failed);
    Ok(())
}
