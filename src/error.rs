//! Error types for the validation worker.

use std::path::PathBuf;

/// Top-level error type for the worker.
///
/// Only startup failures reach the process boundary as an `Error`. Anything
/// that goes wrong while handling a single message is turned into a verdict
/// by the pipeline instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Validator error: {0}")]
    Validator(#[from] ValidatorError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Envelope parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message is missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field {field} has the wrong shape: expected {expected}")]
    WrongShape {
        field: &'static str,
        expected: &'static str,
    },
}

/// Message bus errors.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Subscription {name} could not be established: {reason}")]
    SubscribeFailed { name: String, reason: String },

    #[error("Publish to topic {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Container {0} not found")]
    ContainerNotFound(String),

    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid locator {0}")]
    InvalidLocator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authorization backend errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Permission request failed: {0}")]
    RequestFailed(String),

    #[error("Permission service returned status {0}")]
    Status(u16),

    #[error("Malformed permission response: {0}")]
    MalformedResponse(String),
}

/// Staging area errors.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("File entity not found: {0}")]
    FileNotFound(String),

    #[error("Storage error while staging: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StagingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Structural validator faults.
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("Failed to launch validator {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("Validator exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Validator produced an unreadable report: {0}")]
    Report(String),

    #[error("Validator panicked: {0}")]
    Panicked(String),
}

/// Per-message pipeline failures.
///
/// The `Display` text of each variant is the message that ends up in the
/// published verdict.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid queue message: {0}")]
    MalformedMessage(#[from] EnvelopeError),

    #[error("Request does not have valid file path specified.")]
    MissingFilePath,

    #[error("File path could not be decoded: {0}")]
    MalformedLocator(String),

    #[error("unknown file format")]
    UnknownFormat,

    #[error("Unauthorized request !")]
    Unauthorized,

    #[error("File entity not found: {0}")]
    FileNotFound(String),

    #[error("Error occurred while staging file: {0}")]
    Staging(String),
}

impl PipelineError {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MalformedMessage(_) => "malformed_message",
            Self::MissingFilePath => "missing_file_path",
            Self::MalformedLocator(_) => "malformed_locator",
            Self::UnknownFormat => "unknown_format",
            Self::Unauthorized => "unauthorized",
            Self::FileNotFound(_) => "file_not_found",
            Self::Staging(_) => "staging",
        }
    }
}

impl From<StagingError> for PipelineError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::FileNotFound(locator) => Self::FileNotFound(locator),
            StagingError::Storage(e) => Self::FileNotFound(e.to_string()),
            other => Self::Staging(other.to_string()),
        }
    }
}

/// Result type alias for the worker.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_messages_are_stable() {
        assert_eq!(
            PipelineError::MissingFilePath.to_string(),
            "Request does not have valid file path specified."
        );
        assert_eq!(PipelineError::UnknownFormat.to_string(), "unknown file format");
        assert!(
            PipelineError::Unauthorized
                .to_string()
                .to_lowercase()
                .contains("unauthorized")
        );
    }

    #[test]
    fn staging_not_found_maps_to_file_not_found() {
        let err: PipelineError = StagingError::FileNotFound("https://x/a.zip".into()).into();
        assert!(matches!(err, PipelineError::FileNotFound(ref l) if l == "https://x/a.zip"));
        assert_eq!(err.label(), "file_not_found");
    }

    #[test]
    fn staging_io_maps_to_staging() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: PipelineError = StagingError::io("/tmp/x", io).into();
        assert!(matches!(err, PipelineError::Staging(_)));
        assert!(err.to_string().contains("denied"));
    }
}
