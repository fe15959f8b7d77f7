//! Error types for the Redline SDK.

use crate::network::NetworkError;
use redline_text::TextError;
use std::fmt;

/// Error type for SDK operations.
#[derive(Debug)]
pub enum SdkError {
    /// Document not open in this session.
    DocumentNotFound(String),
    /// Document was closed while the operation was in flight.
    DocumentClosed(String),
    /// Peer not found.
    PeerNotFound(String),
    /// Connection failed.
    ConnectionFailed(String),
    /// Sync error.
    SyncError(String),
    /// Network error.
    NetworkError(String),
    /// Serialization error.
    SerializationError(String),
    /// Error from the text layer.
    Text(TextError),
    /// Internal error.
    Internal(String),
}

impl fmt::Display for SdkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkError::DocumentNotFound(id) => write!(f, "Document not found: {}", id),
            SdkError::DocumentClosed(id) => write!(f, "Document closed: {}", id),
            SdkError::PeerNotFound(id) => write!(f, "Peer not found: {}", id),
            SdkError::ConnectionFailed(e) => write!(f, "Connection failed: {}", e),
            SdkError::SyncError(e) => write!(f, "Sync error: {}", e),
            SdkError::NetworkError(e) => write!(f, "Network error: {}", e),
            SdkError::SerializationError(e) => write!(f, "Serialization error: {}", e),
            SdkError::Text(e) => write!(f, "Text error: {}", e),
            SdkError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for SdkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SdkError::Text(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TextError> for SdkError {
    fn from(err: TextError) -> Self {
        match err {
            TextError::SerializationError(e) => SdkError::SerializationError(e),
            other => SdkError::Text(other),
        }
    }
}

impl From<NetworkError> for SdkError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::PeerNotFound(id) => SdkError::PeerNotFound(id),
            NetworkError::ConnectionFailed(e) => SdkError::ConnectionFailed(e),
            other => SdkError::NetworkError(other.to_string()),
        }
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
