//! Transport error types.

use stream_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Request could not be sent or the response status was an error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The byte stream violated the framing protocol. Never retried: a
    /// malformed server is not a transient condition.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Too many consecutive connection failures without a delivered chunk.
    #[error("Giving up after {attempts} consecutive connection failures")]
    RetriesExhausted { attempts: u32 },

    /// The consumer cancelled the stream.
    #[error("Stream cancelled")]
    Cancelled,
}
