//! Error types for the capture pipeline

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing a node
#[derive(Error, Debug)]
pub enum Error {
    /// The node handle does not belong to the document
    #[error("Invalid node: {0}")]
    InvalidNode(String),

    /// An element was required but another kind of node was supplied
    #[error("Node is not an element: {0}")]
    NotAnElement(String),

    /// A selector could not be parsed
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// Invalid capture options
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Fetching a resource failed (transport error or non-2xx status)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// A data URL was malformed
    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    /// An image or the serialized wrapper could not be decoded
    #[error("Decoding failed: {0}")]
    DecodeError(String),

    /// Encoding the pixel surface failed
    #[error("Encoding failed: {0}")]
    EncodeError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::EncodeError(err.to_string())
    }
}
