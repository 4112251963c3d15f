use thiserror::Error;

/// Main error type for the insert compositor
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Source not found: {path}")]
    SourceNotFound { path: String },

    #[error("Invalid timestamp {timestamp}s: {reason}")]
    InvalidTimestamp { timestamp: f64, reason: String },

    #[error("Invalid insert duration: {duration}s (must be a positive number of seconds)")]
    InvalidDuration { duration: f64 },

    #[error("Failed to decode media file {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("Failed to write output {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Media backend unavailable ({tool}): {reason}")]
    BackendUnavailable { tool: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using CompositorError
pub type Result<T> = std::result::Result<T, CompositorError>;

impl CompositorError {
    pub(crate) fn invalid_timestamp<S: Into<String>>(timestamp: f64, reason: S) -> Self {
        Self::InvalidTimestamp {
            timestamp,
            reason: reason.into(),
        }
    }

    /// Check if this error may succeed when the caller retries.
    ///
    /// The compositor itself never retries.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Disk full, locked output, a backend that was briefly missing
            Self::Write { .. } | Self::Io(_) | Self::BackendUnavailable { .. } => true,
            // Bad input stays bad
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::SourceNotFound { path } => {
                format!("Could not find video file '{}'. Please check the path.", path)
            }
            Self::Decode { path, .. } => {
                format!("Could not read '{}' as a video. Please check it is a supported format.", path)
            }
            Self::BackendUnavailable { tool, .. } => {
                format!("'{}' could not be started. Please install FFmpeg and make sure it is on PATH.", tool)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_recoverable() {
        let write = CompositorError::Write {
            path: "out.mp4".to_string(),
            reason: "disk full".to_string(),
        };
        assert!(write.is_recoverable());

        let decode = CompositorError::Decode {
            path: "broken.mp4".to_string(),
            reason: "moov atom not found".to_string(),
        };
        assert!(!decode.is_recoverable());
        assert!(!CompositorError::invalid_timestamp(10.0, "past end").is_recoverable());
    }

    #[test]
    fn test_user_message_names_the_path() {
        let err = CompositorError::SourceNotFound {
            path: "/tmp/missing.mp4".to_string(),
        };
        assert!(err.user_message().contains("/tmp/missing.mp4"));
    }
}
