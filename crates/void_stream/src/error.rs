//! Error types for the streaming subsystem

use thiserror::Error;

/// Errors returned by manager operations
///
/// These are programmer or setup errors. Load failures never surface here;
/// they are recorded on the entry and observed through its handle.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("No loader registered for asset type '{0}'")]
    UnknownType(String),

    #[error("A loader is already registered for asset type '{0}'")]
    AlreadyRegistered(String),

    #[error("Loaders and sinks cannot be changed once requests have started")]
    RegistryFrozen,

    #[error("Asset type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] std::io::Error),
}

/// Result type for manager operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Reason a load attempt failed
///
/// Stored on `Failed` entries, so it must be cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Dependency '{key}' failed: {reason}")]
    Dependency { key: String, reason: String },

    #[error("Dependency request rejected: {0}")]
    Request(String),

    #[error("Could not schedule load: {0}")]
    Scheduler(String),

    #[error("Loader panicked: {0}")]
    Panicked(String),

    #[error("Loader produced {found}, expected {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("{0}")]
    Custom(String),
}

/// Result type for asset loading
pub type LoadResult<T> = Result<T, LoadError>;

impl LoadError {
    /// Shorthand for a free-form failure
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

impl From<StreamError> for LoadError {
    fn from(e: StreamError) -> Self {
        Self::Request(e.to_string())
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(LoadError::from(missing), LoadError::NotFound(_)));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(LoadError::from(denied), LoadError::Io(_)));
    }

    #[test]
    fn test_stream_error_into_load_error() {
        let err: LoadError = StreamError::UnknownType("Mesh".into()).into();
        assert_eq!(
            err.to_string(),
            "Dependency request rejected: No loader registered for asset type 'Mesh'"
        );
    }
}
