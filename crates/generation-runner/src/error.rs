//! Runner error types.

use thiserror::Error;

/// Errors that abort a run.
///
/// Only failures up to and including stream-generation surface here;
/// post-generation bookkeeping failures are logged and swallowed because
/// the client has already received a complete response.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Upstream generation failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] model_gateway::GatewayError),

    /// Journal could not be read or written.
    #[error("Journal error: {0}")]
    Journal(String),

    /// Chunk appended against a run the buffer does not know.
    #[error("Unknown run: {0}")]
    UnknownRun(String),
}

impl From<std::io::Error> for RunnerError {
    fn from(e: std::io::Error) -> Self {
        RunnerError::Journal(e.to_string())
    }
}

impl From<serde_json::Error> for RunnerError {
    fn from(e: serde_json::Error) -> Self {
        RunnerError::Journal(e.to_string())
    }
}
