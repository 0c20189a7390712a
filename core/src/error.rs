use thiserror::Error;

/// relimg error types
#[derive(Error, Debug)]
pub enum RelimgError {
    /// Malformed image reference string
    #[error("Parse error: '{input}': {reason}")]
    ParseError { input: String, reason: String },

    /// A reference was rendered in a form whose field is absent
    #[error("State error: {0}")]
    StateError(String),

    /// Programming-contract violation by the caller
    #[error("Precondition violated: {0}")]
    PreconditionError(String),

    /// Structural problem in the manifest document
    #[error("Manifest error at {location}: {message}")]
    ManifestError { location: String, message: String },

    /// One or more references could not be resolved and partial output was not allowed
    #[error("{count} image reference(s) could not be resolved")]
    Unresolved { count: usize },

    /// The run was cancelled before resolution finished
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RelimgError {
    /// Shorthand for a [`RelimgError::ParseError`].
    pub fn parse(input: impl Into<String>, reason: impl Into<String>) -> Self {
        RelimgError::ParseError {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`RelimgError::ManifestError`].
    pub fn manifest(location: impl ToString, message: impl Into<String>) -> Self {
        RelimgError::ManifestError {
            location: location.to_string(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RelimgError {
    fn from(err: serde_json::Error) -> Self {
        RelimgError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for RelimgError {
    fn from(err: serde_yaml::Error) -> Self {
        RelimgError::SerializationError(err.to_string())
    }
}

/// Result type alias for relimg operations
pub type Result<T> = std::result::Result<T, RelimgError>;
