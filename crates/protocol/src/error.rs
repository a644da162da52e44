//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type.
///
/// Classification itself is infallible; errors only arise when encoding
/// server frames for the wire.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Failed to serialize a server frame to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
