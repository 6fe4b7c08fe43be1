//! Mock platform implementation for testing
//!
//! A configurable adapter that can stand in for any [`PlatformKind`]. It
//! counts calls and keeps the text it was asked to submit, so integration
//! tests can check what the dispatcher rendered without any network access.
//! Clones share their counters.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::{PlatformError, PlatformResult};
use crate::platforms::{Platform, SubmitRequest};
use crate::types::{CredentialRecord, PlatformKind};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub kind: PlatformKind,

    /// Error returned by `verify`, if any
    pub verify_error: Option<PlatformError>,

    /// Error returned by `submit`, if any
    pub submit_error: Option<PlatformError>,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    pub verify_call_count: Arc<Mutex<usize>>,
    pub submit_call_count: Arc<Mutex<usize>>,

    /// Requests that were submitted (for verification)
    pub submitted: Arc<Mutex<Vec<SubmitRequest>>>,
}

impl MockConfig {
    pub fn new(kind: PlatformKind) -> Self {
        Self {
            kind,
            verify_error: None,
            submit_error: None,
            delay: Duration::ZERO,
            verify_call_count: Arc::new(Mutex::new(0)),
            submit_call_count: Arc::new(Mutex::new(0)),
            submitted: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// A mock that accepts everything
    pub fn success(kind: PlatformKind) -> Self {
        Self::new(MockConfig::new(kind))
    }

    /// A mock whose `verify` always fails
    pub fn verify_failure(kind: PlatformKind, error: PlatformError) -> Self {
        Self::new(MockConfig {
            verify_error: Some(error),
            ..MockConfig::new(kind)
        })
    }

    /// A mock whose `submit` always fails
    pub fn submit_failure(kind: PlatformKind, error: PlatformError) -> Self {
        Self::new(MockConfig {
            submit_error: Some(error),
            ..MockConfig::new(kind)
        })
    }

    pub fn with_delay(kind: PlatformKind, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(kind)
        })
    }

    pub fn verify_call_count(&self) -> usize {
        *lock(&self.config.verify_call_count)
    }

    pub fn submit_call_count(&self) -> usize {
        *lock(&self.config.submit_call_count)
    }

    /// Rendered text of every submission, in call order
    pub fn submitted_text(&self) -> Vec<String> {
        lock(&self.config.submitted)
            .iter()
            .map(|r| r.text.clone())
            .collect()
    }

    pub fn submitted(&self) -> Vec<SubmitRequest> {
        lock(&self.config.submitted).clone()
    }

    async fn simulate_delay(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl Platform for MockPlatform {
    fn kind(&self) -> PlatformKind {
        self.config.kind
    }

    async fn verify(&self, _credential: &CredentialRecord) -> PlatformResult<()> {
        *lock(&self.config.verify_call_count) += 1;
        self.simulate_delay().await;

        match &self.config.verify_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn submit(&self, request: &SubmitRequest) -> PlatformResult<String> {
        *lock(&self.config.submit_call_count) += 1;
        self.simulate_delay().await;

        if let Some(error) = &self.config.submit_error {
            return Err(error.clone());
        }

        lock(&self.config.submitted).push(request.clone());
        Ok(format!("{}:mock-{}", self.config.kind, uuid::Uuid::new_v4()))
    }
}
