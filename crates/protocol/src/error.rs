//! Error types for the wire codec

use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Malformed or truncated wire data
///
/// Fatal to the connection that produced it; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Truncated input while reading {0}")]
    Truncated(&'static str),

    #[error("Invalid continuation marker: {0}")]
    InvalidMarker(u8),

    #[error("Invalid operation kind: {0}")]
    InvalidOperationKind(u8),

    #[error("Loaded operations are not transmitted")]
    LoadedOperation,

    #[error("Invalid key operation: {0}")]
    InvalidKeyOperation(u8),

    #[error("Invalid {what} tag: {tag}")]
    InvalidTag { what: &'static str, tag: u8 },

    #[error("Invalid length: {0}")]
    InvalidLength(i32),

    #[error("Length {0} does not fit an int32 prefix")]
    LengthOverflow(usize),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Payload mismatch for {kind} operation on {rid}")]
    PayloadMismatch { kind: &'static str, rid: String },

    #[error("Failed response carries outcome entries")]
    PartialFailure,

    #[error("Unexpected {0} trailing bytes")]
    TrailingBytes(usize),
}
