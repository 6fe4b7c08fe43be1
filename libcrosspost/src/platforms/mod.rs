//! Platform abstraction and implementations
//!
//! Every supported service is bound to one [`Platform`] adapter. The
//! dispatcher only ever talks to adapters through this trait, so any one of
//! them can be swapped out without touching the others.
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//! use libcrosspost::platforms::{simulated::SimulatedPlatform, Platform, SubmitRequest};
//! use libcrosspost::types::{CredentialRecord, PlatformKind, PlatformOptions};
//!
//! # async fn example() -> libcrosspost::error::PlatformResult<()> {
//! let platform = SimulatedPlatform::new(PlatformKind::Twitter, Duration::ZERO, 0.0);
//!
//! let request = SubmitRequest {
//!     post_id: "post-1".to_string(),
//!     text: "Hello world #rust".to_string(),
//!     media: None,
//!     options: PlatformOptions::default(),
//!     credential: CredentialRecord::new("user-1", PlatformKind::Twitter, "token", "tw-1"),
//! };
//!
//! let external_id = platform.submit(&request).await?;
//! println!("Posted: {}", external_id);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use async_trait::async_trait;

use crate::error::PlatformResult;
use crate::types::{CredentialRecord, MediaRef, PlatformKind, PlatformOptions};

pub mod facebook;
pub mod instagram;
pub mod simulated;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Everything an adapter needs for one submission
///
/// The text is already rendered for the target platform and the media item,
/// when present, is the first one attached to the post.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub post_id: String,
    pub text: String,
    pub media: Option<MediaRef>,
    pub options: PlatformOptions,
    pub credential: CredentialRecord,
}

impl SubmitRequest {
    pub fn user_id(&self) -> &str {
        &self.credential.user_id
    }

    pub fn token(&self) -> &str {
        self.credential.token()
    }
}

/// Capability contract for one platform
#[async_trait]
pub trait Platform: Send + Sync {
    /// Which platform this adapter serves
    fn kind(&self) -> PlatformKind;

    /// Lowercase identifier, e.g. "facebook"
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// Check that a credential is usable before it is stored
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::TokenExpired` when the provider rejects the
    /// token, or `PlatformError::Validation` when required identifiers are
    /// missing from the record.
    async fn verify(&self, credential: &CredentialRecord) -> PlatformResult<()>;

    /// Submit rendered content and return the platform's post id
    ///
    /// # Errors
    ///
    /// Any [`PlatformError`](crate::error::PlatformError) kind. The
    /// dispatcher turns it into a `false` result and a logged reason; nothing
    /// is retried.
    async fn submit(&self, request: &SubmitRequest) -> PlatformResult<String>;
}

/// Native "share to my timeline" mechanism supplied by the host application
#[async_trait]
pub trait ShareHandoff: Send + Sync {
    /// Hand the content over; returns whatever reference the host can give back
    async fn share(&self, text: &str, media: Option<&MediaRef>) -> PlatformResult<String>;
}

/// Makes a local file reachable at a public URL
///
/// Instagram only ingests media it can fetch itself, so local files must be
/// published somewhere first.
#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn publish(&self, path: &Path, mime_type: &str) -> PlatformResult<String>;
}
