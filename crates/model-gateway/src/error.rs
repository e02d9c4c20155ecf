//! Gateway error types.

use thiserror::Error;

/// Errors from the upstream generation gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Authentication failed.
    #[error("Authentication failed")]
    Unauthorized,

    /// Other API error.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Malformed event framing in the upstream stream.
    #[error("Protocol error: {0}")]
    Protocol(#[from] stream_protocol::ProtocolError),

    /// The provider reported a generation failure mid-stream.
    #[error("Upstream generation failed: {0}")]
    Upstream(String),
}
