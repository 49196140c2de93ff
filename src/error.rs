//! Error types for the synthesis pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning a selection into a page.
///
/// The `Display` text of every variant is suitable for showing to the end
/// user as-is.
#[derive(Error, Debug)]
pub enum Error {
    /// Nothing is selected on the canvas
    #[error("First select something to make real.")]
    EmptySelection,

    /// More than one previously generated page is selected
    #[error("You can only have one previous design selected (found {count}).")]
    MultiplePriorArt { count: usize },

    /// The canvas could not produce a vector rendering of the selection
    #[error("Could not render the selection: {0}")]
    RenderUnavailable(String),

    /// Neither the process configuration nor the caller supplied an API key
    #[error("No API key provided in env or ui, please enter your key!")]
    MissingCredentials,

    /// Transport-level failure talking to the inference endpoint
    #[error("Network error: {0}")]
    RemoteError(String),

    /// The inference service answered with a structured error body
    #[error("{preview}...")]
    ApiError { preview: String },

    /// The completion did not contain a recognizable HTML document
    #[error("The model response did not contain an HTML document")]
    NoDocumentFound,

    /// The canvas refused a shape mutation
    #[error("Canvas error: {0}")]
    CanvasError(String),

    /// Failed to encode or decode image data
    #[error("Encoding failed: {0}")]
    EncodeError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Local service failure (bind, malformed request)
    #[error("Service error: {0}")]
    ServiceError(String),
}

impl Error {
    /// Build an `ApiError` from the remote message, keeping at most
    /// `max_chars` characters of it.
    pub fn api(message: &str, max_chars: usize) -> Self {
        Error::ApiError {
            preview: message.chars().take(max_chars).collect(),
        }
    }

    /// True for failures raised before any shape is created or any network
    /// call is made.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::EmptySelection
                | Error::MultiplePriorArt { .. }
                | Error::RenderUnavailable(_)
                | Error::MissingCredentials
        )
    }
}

#[cfg(feature = "openai")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::RemoteError(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::EncodeError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_preview_is_bounded() {
        let long = "x".repeat(500);
        match Error::api(&long, 100) {
            Error::ApiError { preview } => assert_eq!(preview.chars().count(), 100),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn api_error_display_marks_truncation() {
        let err = Error::api("Incorrect API key provided", 100);
        assert_eq!(err.to_string(), "Incorrect API key provided...");
    }

    #[test]
    fn preconditions_are_classified() {
        assert!(Error::EmptySelection.is_precondition());
        assert!(Error::MultiplePriorArt { count: 2 }.is_precondition());
        assert!(Error::MissingCredentials.is_precondition());
        assert!(!Error::NoDocumentFound.is_precondition());
        assert!(!Error::RemoteError("reset".into()).is_precondition());
    }
}
