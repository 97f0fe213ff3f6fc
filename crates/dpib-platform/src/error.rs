//! Platform-specific errors

use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Proxy executable missing or not runnable
    #[error("Proxy executable not found: {0}")]
    ExecutableNotFound(String),

    /// The proxy process could not be started
    #[error("Failed to spawn proxy: {0}")]
    SpawnFailed(String),

    /// The proxy process could not be signalled or reaped
    #[error("Process error: {0}")]
    ProcessError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Platform result type
pub type Result<T> = std::result::Result<T, PlatformError>;

impl PlatformError {
    /// Convert into the engine's proxy error for `action`
    pub fn into_proxy_error(self, action: &'static str) -> dpib_core::Error {
        dpib_core::Error::proxy(action, self.to_string())
    }
}
