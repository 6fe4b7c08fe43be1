//! Logging setup shared by the Crosspost binaries
//!
//! Supports text, JSON and pretty output, with `EnvFilter` level control.
//!
//! ```no_run
//! use libcrosspost::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false)
//!     .init()
//!     .expect("no subscriber installed yet");
//! ```

use std::str::FromStr;

use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output (no colors, for piping)
    Text,
    /// Machine-parseable JSON (one JSON object per line)
    Json,
    /// Pretty-printed with colors (for development)
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    /// `verbose` forces the debug level unless `RUST_LOG` is set
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    fn filter_directive(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }

    /// Output layer for the chosen format; everything goes to stderr so
    /// stdout stays free for post results
    fn output_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer().with_writer(std::io::stderr);
        match self.format {
            LogFormat::Json => layer
                .json()
                .with_current_span(true)
                .flatten_event(true)
                .boxed(),
            LogFormat::Pretty => layer.pretty().with_file(true).with_line_number(true).boxed(),
            LogFormat::Text => layer.with_target(false).boxed(),
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    ///
    /// Fails if a global subscriber is already installed; the existing one
    /// stays in place.
    pub fn init(&self) -> Result<(), TryInitError> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.filter_directive()));

        tracing_subscriber::registry()
            .with(self.output_layer())
            .with(filter)
            .try_init()
    }
}

/// Initialize logging from `XPOST_LOG_FORMAT` / `XPOST_LOG_LEVEL`
///
/// Falls back to text format at warn level, or debug when `verbose`. An
/// unrecognised `XPOST_LOG_FORMAT` is reported once logging is up.
pub fn init_default(verbose: bool) -> Result<(), TryInitError> {
    let requested = std::env::var("XPOST_LOG_FORMAT").ok();
    let parsed = requested.as_deref().map(str::parse::<LogFormat>);
    let format = match &parsed {
        Some(Ok(format)) => *format,
        _ => LogFormat::Text,
    };

    let level = std::env::var("XPOST_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());

    LoggingConfig::new(format, level, verbose).init()?;
    if let Some(Err(e)) = parsed {
        warn!("{}; using text", e);
    }
    Ok(())
}
