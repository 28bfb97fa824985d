//! Error types for the realtime client
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - Typed classification (retryable / authentication)
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Connection errors (3xx)
    ConnectionFailed = 300,
    ConnectionTimeout = 301,
    ServerUnavailable = 302,
    ConnectionLost = 303,
    TlsError = 304,

    // Protocol errors (4xx)
    ProtocolMalformed = 401,
    ProtocolUnexpected = 402,
    AuthenticationFailed = 403,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Connection errors
            400..=499 => 40, // Protocol errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the client
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO / Serialization Errors
    // ─────────────────────────────────────────────────────────────

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Transport Errors
    // ─────────────────────────────────────────────────────────────

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // ─────────────────────────────────────────────────────────────
    // Connection Errors
    // ─────────────────────────────────────────────────────────────

    /// Connection failed
    #[error("Failed to connect to {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// Connection timeout
    #[error("Connection to {url} timed out after {timeout_ms}ms")]
    ConnectionTimeout { url: String, timeout_ms: u64 },

    /// Server did not answer the liveness probe
    #[error("Realtime server at {url} is unavailable")]
    ServerUnavailable { url: String },

    /// Connection lost
    #[error("Lost connection to realtime server: {message}")]
    ConnectionLost { message: String },

    /// Generic connection error
    #[error("Connection error: {0}")]
    Connection(String),

    // ─────────────────────────────────────────────────────────────
    // Protocol Errors
    // ─────────────────────────────────────────────────────────────

    /// Malformed frame
    #[error("Malformed protocol message: {message}")]
    ProtocolMalformed { message: String },

    /// Authentication failed
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Generic protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::ProtocolMalformed,

            Error::WebSocket(e) => {
                if ws_status(e).map_or(false, is_auth_status) {
                    ErrorCode::AuthenticationFailed
                } else if matches!(e, tokio_tungstenite::tungstenite::Error::Tls(_)) {
                    ErrorCode::TlsError
                } else {
                    ErrorCode::ConnectionFailed
                }
            }
            Error::Http(e) => {
                if e.status().map_or(false, |s| is_auth_status(s.as_u16())) {
                    ErrorCode::AuthenticationFailed
                } else if e.is_timeout() {
                    ErrorCode::ConnectionTimeout
                } else {
                    ErrorCode::ConnectionFailed
                }
            }

            Error::ConnectionFailed { .. } => ErrorCode::ConnectionFailed,
            Error::ConnectionTimeout { .. } => ErrorCode::ConnectionTimeout,
            Error::ServerUnavailable { .. } => ErrorCode::ServerUnavailable,
            Error::ConnectionLost { .. } => ErrorCode::ConnectionLost,
            Error::Connection(_) => ErrorCode::ConnectionFailed,

            Error::ProtocolMalformed { .. } => ErrorCode::ProtocolMalformed,
            Error::AuthenticationFailed { .. } => ErrorCode::AuthenticationFailed,
            Error::Protocol(_) => ErrorCode::ProtocolUnexpected,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is an authentication-class failure.
    ///
    /// Retrying with the same credential cannot succeed, so the session
    /// driver stops reconnecting when this returns true.
    pub fn is_auth_failure(&self) -> bool {
        self.code() == ErrorCode::AuthenticationFailed
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        if self.is_auth_failure() {
            return false;
        }
        matches!(
            self,
            Error::ConnectionFailed { .. }
                | Error::ConnectionTimeout { .. }
                | Error::ServerUnavailable { .. }
                | Error::ConnectionLost { .. }
                | Error::Connection(_)
                | Error::WebSocket(_)
                | Error::Http(_)
                | Error::Io(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.code() {
            ErrorCode::ConfigNotFound => Some(
                "Run 'realtime-client config init' to create a default configuration file."
            ),
            ErrorCode::ConfigParseError => Some(
                "Check your configuration file syntax. Run 'realtime-client config validate' to see details."
            ),
            ErrorCode::ConfigValidation => Some(
                "Review the configuration file and fix the invalid values."
            ),
            ErrorCode::ConnectionFailed => Some(
                "Check your network connection and verify the server URL is correct."
            ),
            ErrorCode::ConnectionTimeout => Some(
                "The realtime server may be down or unreachable. Check your firewall settings."
            ),
            ErrorCode::ServerUnavailable => Some(
                "The /health endpoint did not answer. Live updates stay disabled until the server is back."
            ),
            ErrorCode::ConnectionLost => Some(
                "Connection was interrupted. The client will automatically attempt to reconnect."
            ),
            ErrorCode::AuthenticationFailed => Some(
                "The session token was rejected. Sign in again to obtain a fresh token."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }

    /// Snapshot the error for delivery to event listeners
    pub fn report(&self) -> ErrorReport {
        ErrorReport::from(self)
    }
}

/// HTTP status carried by a failed WebSocket handshake, if any
fn ws_status(err: &tokio_tungstenite::tungstenite::Error) -> Option<u16> {
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => Some(response.status().as_u16()),
        _ => None,
    }
}

fn is_auth_status(status: u16) -> bool {
    status == 401 || status == 403
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConnectionFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a connection timeout error
    pub fn connection_timeout(url: impl Into<String>, timeout_ms: u64) -> Self {
        Error::ConnectionTimeout {
            url: url.into(),
            timeout_ms,
        }
    }

    /// Create an authentication failure
    pub fn auth_failed(message: impl Into<String>) -> Self {
        Error::AuthenticationFailed {
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Report
// ─────────────────────────────────────────────────────────────────

/// Cloneable snapshot of an [`Error`], delivered with the
/// `connection_error` and `socket_error` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// String error code (e.g. "E403")
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// Whether the failure was classified as authentication-related
    pub auth: bool,
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code().as_str(),
            message: err.to_string(),
            auth: err.is_auth_failure(),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
