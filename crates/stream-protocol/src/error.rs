//! Protocol error types.

use thiserror::Error;

/// Errors in stream framing or identification. These are fatal for the
/// connection that produced them and are never retried.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A frame could not be parsed into a known chunk.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The start response did not carry a run identifier.
    #[error("Missing run identifier header")]
    MissingRunId,

    /// Frame bytes were not valid UTF-8.
    #[error("Invalid frame encoding: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),
}
