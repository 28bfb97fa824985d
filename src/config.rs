//! Configuration system for the realtime client
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (REALTIME_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channel::{ClientConfig, ReconnectPolicy};
use crate::error::{Error, Result};
use crate::transport::{parse_base_url, TransportKind};

/// Base URL used when nothing is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Server location
    pub server: ServerSettings,

    /// Connection and reconnection tuning
    pub connection: ConnectionSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Server location settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// REST API URL; the realtime base URL is this minus a trailing `/api`
    pub api_url: String,
}

/// Connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Transport handshake timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Health probe timeout in milliseconds
    pub probe_timeout_ms: u64,

    /// Maximum reconnection attempts after a lost session (0 = never retry)
    pub max_reconnect_attempts: u32,

    /// Delay before the first reconnection attempt in milliseconds
    pub reconnect_base_delay_ms: u64,

    /// Upper bound for a single reconnection delay in milliseconds
    pub max_reconnect_delay_ms: u64,

    /// Transports to try, in preference order
    pub transports: Vec<TransportKind>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_url: format!("{}/api", DEFAULT_BASE_URL),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            probe_timeout_ms: 5_000,
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl RealtimeConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::ConfigNotFound {
                path: path.clone(),
                source: Some(e),
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: format!("{}: {}", path.display(), e.message()),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // An explicit path must exist
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            // Current directory
            PathBuf::from("realtime-client.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("realtime-client").join("config.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".realtime-client").join("config.toml"))
                .unwrap_or_default(),
            // System config (Linux)
            PathBuf::from("/etc/realtime-client/config.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    pub(crate) fn apply_env_overrides(&mut self) {
        // Server settings
        if let Ok(val) = std::env::var("REALTIME_API_URL") {
            self.server.api_url = val;
        }

        // Connection settings
        override_number("REALTIME_CONNECT_TIMEOUT_MS", &mut self.connection.connect_timeout_ms);
        override_number("REALTIME_PROBE_TIMEOUT_MS", &mut self.connection.probe_timeout_ms);
        override_number(
            "REALTIME_MAX_RECONNECT_ATTEMPTS",
            &mut self.connection.max_reconnect_attempts,
        );
        override_number(
            "REALTIME_RECONNECT_BASE_DELAY_MS",
            &mut self.connection.reconnect_base_delay_ms,
        );

        // Logging settings
        if let Ok(val) = std::env::var("REALTIME_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("REALTIME_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("REALTIME_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.api_url.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "server.api_url",
                "API URL cannot be empty",
            ));
        }
        parse_base_url(&self.base_url())?;

        let conn = &self.connection;
        for (field, value) in [
            ("connection.connect_timeout_ms", conn.connect_timeout_ms),
            ("connection.probe_timeout_ms", conn.probe_timeout_ms),
            ("connection.reconnect_base_delay_ms", conn.reconnect_base_delay_ms),
            ("connection.max_reconnect_delay_ms", conn.max_reconnect_delay_ms),
        ] {
            if value == 0 {
                return Err(Error::config_field_invalid(field, format!("{} must be positive", field)));
            }
        }

        if conn.max_reconnect_delay_ms < conn.reconnect_base_delay_ms {
            return Err(Error::config_field_invalid(
                "connection.max_reconnect_delay_ms",
                "max_reconnect_delay_ms must not be below reconnect_base_delay_ms",
            ));
        }

        if conn.transports.is_empty() {
            return Err(Error::config_field_invalid(
                "connection.transports",
                "At least one transport must be configured",
            ));
        }
        let unique: HashSet<_> = conn.transports.iter().collect();
        if unique.len() != conn.transports.len() {
            return Err(Error::config_field_invalid(
                "connection.transports",
                "Transports must not be listed twice",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Realtime server base URL derived from `server.api_url`
    pub fn base_url(&self) -> String {
        derive_base_url(&self.server.api_url)
    }

    /// Client settings for [`EventChannelClient`](crate::channel::EventChannelClient)
    pub fn client_config(&self) -> ClientConfig {
        let conn = &self.connection;
        ClientConfig {
            base_url: self.base_url(),
            connect_timeout: Duration::from_millis(conn.connect_timeout_ms),
            probe_timeout: Duration::from_millis(conn.probe_timeout_ms),
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(conn.reconnect_base_delay_ms),
                max_delay: Duration::from_millis(conn.max_reconnect_delay_ms),
                max_attempts: conn.max_reconnect_attempts,
            },
            transports: conn.transports.clone(),
        }
    }
}

/// Strip a trailing `/api` segment (and trailing slashes) from an API URL.
///
/// An empty input yields [`DEFAULT_BASE_URL`].
pub fn derive_base_url(api_url: &str) -> String {
    let trimmed = api_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }

    trimmed
        .strip_suffix("/api")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

fn override_number<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(val) = std::env::var(var) {
        match val.parse() {
            Ok(n) => *target = n,
            Err(_) => warn!(var = var, value = %val, "Ignoring non-numeric environment override"),
        }
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file, returning where it was written
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".realtime-client")
                .join("config.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# Realtime Client Configuration

[server]
# REST API URL; the realtime server lives at the same origin without /api
api_url = "http://localhost:5000/api"

[connection]
# Transport handshake timeout in milliseconds
connect_timeout_ms = 10000

# Health probe timeout in milliseconds
probe_timeout_ms = 5000

# Maximum reconnection attempts after a lost session (0 = never retry)
max_reconnect_attempts = 5

# Delay before the first reconnection attempt; doubles on each retry
reconnect_base_delay_ms = 1000

# Upper bound for a single reconnection delay
max_reconnect_delay_ms = 30000

# Transports to try, in preference order
transports = ["websocket", "polling"]

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.realtime-client/logs/client.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
