//! Error types for the image analyzer.

use thiserror::Error;

/// Message shown when analysis is requested with nothing loaded.
pub const NO_IMAGE_MESSAGE: &str = "Please upload an image first.";

/// Startup configuration problems. Always fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY (or API_KEY) environment variable is not set")]
    MissingApiKey,
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Failure while reading an uploaded file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to read the selected file: {0}")]
    Read(String),
}

/// Any failure of the remote analysis call.
///
/// Transport faults, service errors and empty replies all collapse into
/// this one kind; the message is meant for display.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct AnalysisError {
    message: String,
}

impl AnalysisError {
    /// Wraps a cause with the standard prefix, or the generic message when
    /// the cause carries no detail.
    pub fn from_cause(cause: impl std::fmt::Display) -> Self {
        let detail = cause.to_string();
        if detail.trim().is_empty() {
            return Self {
                message: "An unknown error occurred during image analysis.".to_string(),
            };
        }
        Self {
            message: format!("Failed to analyze image: {detail}"),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Analysis requested while no image is loaded.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("{}", NO_IMAGE_MESSAGE)]
pub struct NoImageError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_error_keeps_cause() {
        let err = AnalysisError::from_cause("503 Service Unavailable");
        assert_eq!(
            err.to_string(),
            "Failed to analyze image: 503 Service Unavailable"
        );
    }

    #[test]
    fn blank_cause_uses_generic_message() {
        let err = AnalysisError::from_cause("  ");
        assert_eq!(err.message(), "An unknown error occurred during image analysis.");
    }

    #[test]
    fn no_image_message() {
        assert_eq!(NoImageError.to_string(), "Please upload an image first.");
    }
}
