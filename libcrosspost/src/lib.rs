//! Crosspost - relay one composed post to several social platforms
//!
//! This library keeps per-user platform credentials, renders a post for each
//! platform's conventions and submits it through per-platform adapters,
//! recording what happened on each one independently.

pub mod config;
pub mod credentials;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod formatting;
pub mod graph;
pub mod logging;
pub mod platforms;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{CredentialManager, CredentialStore};
pub use db::Database;
pub use dispatcher::{DispatchReport, Dispatcher, PlatformOutcome};
pub use error::{CrosspostError, PlatformError, Result};
pub use service::CrosspostService;
pub use types::{CredentialRecord, MediaRef, PlatformKind, PlatformOptions, Post, PostStatus};
