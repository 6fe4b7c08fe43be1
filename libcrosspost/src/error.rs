//! Error types for Crosspost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosspostError>;

/// Result of a single platform operation
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

#[derive(Error, Debug)]
pub enum CrosspostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosspostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosspostError::InvalidInput(_) => 3,
            CrosspostError::Platform(PlatformError::NotConnected(_))
            | CrosspostError::Platform(PlatformError::TokenExpired(_)) => 2,
            CrosspostError::Platform(_) => 1,
            CrosspostError::Config(_) => 1,
            CrosspostError::Database(_) => 1,
        }
    }

    /// The platform-level error, if this is one
    pub fn as_platform(&self) -> Option<&PlatformError> {
        match self {
            CrosspostError::Platform(e) => Some(e),
            _ => None,
        }
    }

    /// Collapse into a [`PlatformError`] for reporting a platform failure
    pub fn into_platform_error(self) -> PlatformError {
        match self {
            CrosspostError::Platform(e) => e,
            other => PlatformError::Api(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt stored value in {column}: {reason}")]
    Corrupt { column: String, reason: String },
}

/// Per-platform failure kinds.
///
/// These are the reasons surfaced to callers of the dispatcher; the
/// `Display` output is what ends up in the error log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Authentication required: {0}")]
    NotConnected(String),

    #[error("Token expired or invalid, re-authentication required: {0}")]
    TokenExpired(String),

    #[error("Permission error, check the app configuration: {0}")]
    PermissionDenied(String),

    #[error("Rate limited, try again later: {0}")]
    RateLimited(String),

    #[error("App review required for posting permissions: {0}")]
    AppReviewRequired(String),

    #[error("Media upload failed: {0}")]
    MediaUpload(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Platform error: {0}")]
    Api(String),
}

impl PlatformError {
    /// Map a Graph API error code to the matching failure kind.
    ///
    /// The vendor message is carried verbatim.
    pub fn from_graph_code(code: i64, message: &str) -> Self {
        let message = message.to_string();
        match code {
            190 => PlatformError::TokenExpired(message),
            100 => PlatformError::PermissionDenied(message),
            1 => PlatformError::RateLimited(message),
            200 | 294 => PlatformError::AppReviewRequired(message),
            _ => PlatformError::Api(message),
        }
    }

    /// Whether the caller could reasonably try again later.
    ///
    /// Informational only; nothing in this crate retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::RateLimited(_) | PlatformError::Network(_))
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(error: reqwest::Error) -> Self {
        PlatformError::Network(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = CrosspostError::InvalidInput("Empty platform list".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_errors() {
        let missing = CrosspostError::Platform(PlatformError::NotConnected("facebook".to_string()));
        let expired = CrosspostError::Platform(PlatformError::TokenExpired("facebook".to_string()));
        assert_eq!(missing.exit_code(), 2);
        assert_eq!(expired.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_errors() {
        let api = CrosspostError::Platform(PlatformError::Api("boom".to_string()));
        assert_eq!(api.exit_code(), 1);

        let config = CrosspostError::Config(ConfigError::MissingField("database.path".to_string()));
        assert_eq!(config.exit_code(), 1);

        let db = CrosspostError::Database(DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        )));
        assert_eq!(db.exit_code(), 1);
    }

    #[test]
    fn test_graph_code_mapping() {
        assert!(matches!(
            PlatformError::from_graph_code(190, "Session has expired"),
            PlatformError::TokenExpired(_)
        ));
        assert!(matches!(
            PlatformError::from_graph_code(100, "Invalid parameter"),
            PlatformError::PermissionDenied(_)
        ));
        assert!(matches!(
            PlatformError::from_graph_code(1, "Please reduce the amount of data"),
            PlatformError::RateLimited(_)
        ));
        assert!(matches!(
            PlatformError::from_graph_code(200, "Permissions error"),
            PlatformError::AppReviewRequired(_)
        ));
        assert!(matches!(
            PlatformError::from_graph_code(294, "Managing advertisements requires"),
            PlatformError::AppReviewRequired(_)
        ));
    }

    #[test]
    fn test_unknown_graph_code_keeps_vendor_message() {
        let error = PlatformError::from_graph_code(368, "The action attempted has been deemed abusive");
        assert_eq!(
            error,
            PlatformError::Api("The action attempted has been deemed abusive".to_string())
        );
        assert_eq!(
            error.to_string(),
            "Platform error: The action attempted has been deemed abusive"
        );
    }

    #[test]
    fn test_error_message_formatting() {
        let error = CrosspostError::Platform(PlatformError::NotConnected(
            "instagram is not connected".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Platform error: Authentication required: instagram is not connected"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(PlatformError::RateLimited("slow down".to_string()).is_transient());
        assert!(PlatformError::Network("reset".to_string()).is_transient());
        assert!(!PlatformError::TokenExpired("expired".to_string()).is_transient());
        assert!(!PlatformError::MediaUpload("unreadable".to_string()).is_transient());
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let error: CrosspostError = PlatformError::Validation("empty".to_string()).into();
        assert!(matches!(error.as_platform(), Some(PlatformError::Validation(_))));
    }

    #[test]
    fn test_into_platform_error() {
        let platform: CrosspostError = PlatformError::RateLimited("wait".to_string()).into();
        assert_eq!(
            platform.into_platform_error(),
            PlatformError::RateLimited("wait".to_string())
        );

        let config = CrosspostError::Config(ConfigError::MissingField("database.path".to_string()));
        assert!(matches!(config.into_platform_error(), PlatformError::Api(msg) if msg.contains("database.path")));
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(original, cloned);
    }
}
