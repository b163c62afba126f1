//! Error types for colsketch.

use thiserror::Error;

/// Errors that can occur while building, storing, or querying sketches.
#[derive(Debug, Error)]
pub enum SketchError {
    /// A sketch or index artifact does not exist (recoverable by building it).
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid parameter, malformed column key, or unsupported column type.
    #[error("validation error: {0}")]
    Validation(String),

    /// Two signatures (or a signature and an index) disagree on permutation count.
    #[error("permutation count mismatch: expected {expected}, got {actual}")]
    PermutationMismatch { expected: usize, actual: usize },

    /// I/O error from a storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Upstream value fetch failed while building one column's sketch.
    #[error("failed to build sketch for {column}: {reason}")]
    Build { column: String, reason: String },

    /// Stored bytes do not decode to a valid sketch.
    #[error("format error: {0}")]
    Format(String),

    /// Artifact encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration file could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SketchError {
    /// True for errors that a build would resolve.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True for parameter and input validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::PermutationMismatch { .. })
    }
}

impl From<postcard::Error> for SketchError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(format!("postcard error: {e}"))
    }
}

impl From<toml::de::Error> for SketchError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for colsketch operations.
pub type Result<T> = std::result::Result<T, SketchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(SketchError::NotFound("x".into()).is_not_found());
        assert!(SketchError::Validation("x".into()).is_validation());
        assert!(SketchError::PermutationMismatch {
            expected: 128,
            actual: 64
        }
        .is_validation());
        assert!(!SketchError::Format("x".into()).is_validation());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SketchError = io.into();
        assert!(matches!(err, SketchError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}
