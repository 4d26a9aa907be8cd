use std::fmt;

/// Result type for tracking environment operations
pub type Result<T> = std::result::Result<T, TrackError>;

/// Main error type for the tracking environments
#[derive(Debug, Clone)]
pub enum TrackError {
    /// Invalid dimensions for operations
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid parameter value
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Invalid action index
    InvalidAction {
        action: usize,
        max_actions: usize,
    },

    /// Fixed-path variants constructed without their path input
    MissingPath(String),

    /// Unknown environment id passed to `make`
    UnknownEnvironment(String),

    /// Numerical computation errors (e.g. non positive-definite covariance)
    NumericalError(String),

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            TrackError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            TrackError::InvalidAction { action, max_actions } => {
                write!(f, "Invalid action {}: must be less than {}", action, max_actions)
            }
            TrackError::MissingPath(msg) => write!(f, "Missing target path: {}", msg),
            TrackError::UnknownEnvironment(name) => write!(f, "Unknown environment '{}'", name),
            TrackError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
            TrackError::IoError(msg) => write!(f, "IO error: {}", msg),
            TrackError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for TrackError {}

impl From<std::io::Error> for TrackError {
    fn from(err: std::io::Error) -> Self {
        TrackError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for TrackError {
    fn from(err: serde_json::Error) -> Self {
        TrackError::SerializationError(err.to_string())
    }
}

// Helper functions for common error patterns
impl TrackError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        TrackError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        TrackError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = TrackError::InvalidAction { action: 14, max_actions: 12 };
        assert_eq!(err.to_string(), "Invalid action 14: must be less than 12");

        let err = TrackError::invalid_parameter("num_targets", "must be positive");
        assert_eq!(err.to_string(), "Invalid parameter 'num_targets': must be positive");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "path_1.json");
        let err: TrackError = io.into();
        assert!(matches!(err, TrackError::IoError(_)));
    }
}
