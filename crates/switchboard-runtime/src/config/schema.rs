//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use switchboard_framework::{DEFAULT_ROUTE_FIELD, DispatchOptions};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SwitchboardConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Socket server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `compact` otherwise.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Maximum number of log files kept in the log directory.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Per-module levels, e.g. `switchboard_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    /// Span lifecycle events.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file names and line numbers.
    #[serde(default)]
    pub file_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            max_files: default_max_files(),
            filters: HashMap::new(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
        }
    }
}

fn default_max_files() -> u32 {
    5
}

// =============================================================================
// Server
// =============================================================================

/// WebSocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub path: String,

    /// Outbound message buffer per session.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl ServerConfig {
    /// The bind address, `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_ws_path(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_outbound_buffer() -> usize {
    256
}

// =============================================================================
// Dispatch
// =============================================================================

/// Dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Payload field carrying the route path.
    #[serde(default = "default_route_field")]
    pub route_field: String,

    /// Answer unmapped paths with an error response instead of dropping them.
    #[serde(default)]
    pub reply_unknown_path: bool,

    /// Include every controller registered with `#[socket_controller]`.
    #[serde(default = "default_discover")]
    pub discover: bool,
}

impl DispatchConfig {
    /// Converts to dispatcher options.
    pub fn to_options(&self) -> DispatchOptions {
        DispatchOptions {
            route_field: self.route_field.clone(),
            reply_unknown_path: self.reply_unknown_path,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            route_field: default_route_field(),
            reply_unknown_path: false,
            discover: default_discover(),
        }
    }
}

fn default_route_field() -> String {
    DEFAULT_ROUTE_FIELD.to_string()
}

fn default_discover() -> bool {
    true
}
