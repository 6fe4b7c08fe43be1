//! Configuration management for Crosspost

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::credentials::MAX_PAGE_TOKEN_TTL_DAYS;
use crate::error::{ConfigError, Result};
use crate::types::PlatformKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub facebook: Option<FacebookConfig>,
    #[serde(default)]
    pub instagram: Option<InstagramConfig>,
    #[serde(default)]
    pub simulated: Option<SimulatedConfig>,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Assumed lifetime of a cached page token; a policy choice, not a vendor guarantee
    #[serde(default = "default_page_token_ttl_days")]
    pub page_token_ttl_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_poll_interval_ms")]
    pub publish_poll_interval_ms: u64,
    #[serde(default = "default_poll_attempts")]
    pub publish_poll_attempts: u32,
}

/// Stand-ins for platforms without a real integration yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedConfig {
    #[serde(default = "default_simulated_platforms")]
    pub platforms: Vec<PlatformKind>,
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Submit to platforms concurrently instead of one after another
    #[serde(default)]
    pub concurrent: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout; unset keeps the HTTP client's default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub platforms: Vec<PlatformKind>,
}

fn default_enabled() -> bool {
    true
}

fn default_graph_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v19.0".to_string()
}

fn default_page_token_ttl_days() -> i64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_poll_attempts() -> u32 {
    10
}

fn default_simulated_platforms() -> Vec<PlatformKind> {
    vec![PlatformKind::Youtube, PlatformKind::Twitter, PlatformKind::Tiktok]
}

fn default_latency_ms() -> u64 {
    1_000
}

fn default_failure_rate() -> f64 {
    0.05
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            graph_url: default_graph_url(),
            api_version: default_api_version(),
            page_token_ttl_days: default_page_token_ttl_days(),
        }
    }
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            graph_url: default_graph_url(),
            api_version: default_api_version(),
            publish_poll_interval_ms: default_poll_interval_ms(),
            publish_poll_attempts: default_poll_attempts(),
        }
    }
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            platforms: default_simulated_platforms(),
            latency_ms: default_latency_ms(),
            failure_rate: default_failure_rate(),
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/crosspost/posts.db".to_string(),
            },
            facebook: Some(FacebookConfig::default()),
            instagram: Some(InstagramConfig::default()),
            simulated: Some(SimulatedConfig::default()),
            dispatch: DispatchConfig::default(),
            http: HttpConfig::default(),
            defaults: DefaultsConfig {
                platforms: vec![PlatformKind::Facebook],
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }

        if let Some(simulated) = &self.simulated {
            if !(0.0..=1.0).contains(&simulated.failure_rate) {
                return Err(ConfigError::InvalidValue {
                    field: "simulated.failure_rate".to_string(),
                    reason: format!("{} is not between 0 and 1", simulated.failure_rate),
                }
                .into());
            }
            if let Some(real) = simulated
                .platforms
                .iter()
                .find(|p| matches!(p, PlatformKind::Facebook | PlatformKind::Instagram))
            {
                return Err(ConfigError::InvalidValue {
                    field: "simulated.platforms".to_string(),
                    reason: format!("{} has a real integration and cannot be simulated", real),
                }
                .into());
            }
        }

        if let Some(facebook) = &self.facebook {
            if !(1..=MAX_PAGE_TOKEN_TTL_DAYS).contains(&facebook.page_token_ttl_days) {
                return Err(ConfigError::InvalidValue {
                    field: "facebook.page_token_ttl_days".to_string(),
                    reason: format!(
                        "{} is not between 1 and {}",
                        facebook.page_token_ttl_days, MAX_PAGE_TOKEN_TTL_DAYS
                    ),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("XPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}

/// Expand `~` and environment variables in a configured database path
pub fn resolve_db_path(path: &str) -> Result<PathBuf> {
    if path == ":memory:" {
        return Ok(PathBuf::from(path));
    }

    let expanded = shellexpand::full(path).map_err(|e| ConfigError::InvalidValue {
        field: "database.path".to_string(),
        reason: e.to_string(),
    })?;

    Ok(PathBuf::from(expanded.as_ref()))
}
