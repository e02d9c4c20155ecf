//! Client-side resumable streaming over the chunk protocol.
//!
//! The transport hides connection churn from the consumer: it tracks how
//! many chunks were actually delivered and reconnects with that index, so
//! the application sees one continuous, exactly-once chunk sequence.

mod client;
mod error;

pub use client::{CancelHandle, RunStream, StreamTransport, TransportConfig};
pub use error::TransportError;
