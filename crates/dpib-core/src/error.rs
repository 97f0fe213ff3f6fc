//! Error types for dpib-core
//!
//! Centralized error handling using `thiserror` for ergonomic error definitions.

use thiserror::Error;

/// Main error type for dpib-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// Path to the missing config file
        path: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    ConfigValue {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// List source (targets or candidates) could not be read
    #[error("Source file error for '{path}': {message}")]
    Source {
        /// Path to the source file
        path: String,
        /// Error message
        message: String,
    },

    /// The proxy control surface rejected a request
    #[error("Proxy {action} failed: {message}")]
    Proxy {
        /// Requested action (configure, start, stop)
        action: &'static str,
        /// Error message
        message: String,
    },

    /// Durable state could not be read or written
    #[error("State store error: {0}")]
    State(String),

    /// Another run is active in this process
    #[error("A benchmark run is already in progress")]
    RunInProgress,

    /// The run was cancelled by the operator
    #[error("Benchmark cancelled")]
    Cancelled,

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a config value error
    pub fn config_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a proxy control error
    pub fn proxy(action: &'static str, message: impl Into<String>) -> Self {
        Self::Proxy {
            action,
            message: message.into(),
        }
    }

    /// Create a state store error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    /// Whether this error is the cooperative cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
