//! Error types for Lantern

use std::path::PathBuf;

/// Lantern error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No {} found in {} or any parent directory", crate::constants::SETUP_FILE, .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Invalid config at {}: {message}", path.display())]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("No service '{name}' configured in {}", config_path.display())]
    ServiceNotFound { name: String, config_path: PathBuf },

    #[error("No default service in {}; pass a service name", .0.display())]
    ServiceNameRequired(PathBuf),

    #[error("Service already exists: {0}")]
    ServiceAlreadyExists(String),

    #[error("No available ports in range {start}-{end}")]
    PortsExhausted { start: u16, end: u16 },

    #[error("Port {0} is already in use")]
    PortUnavailable(u16),

    #[error("Process failed to start: {0}")]
    SpawnFailed(String),

    #[error("Invalid launch payload: {0}")]
    InvalidPayload(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Database error: {0}")]
    DbError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for Lantern
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config_invalid<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        Error::ConfigInvalid {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn db<S: Into<String>>(msg: S) -> Self {
        Error::DbError(msg.into())
    }

    pub fn spawn<S: Into<String>>(msg: S) -> Self {
        Error::SpawnFailed(msg.into())
    }

    /// True for the "not configured" family: the CLI prints setup guidance for these
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound(_)
                | Error::ConfigInvalid { .. }
                | Error::ServiceNotFound { .. }
                | Error::ServiceNameRequired(_)
        )
    }
}
