//! Wire protocol for generation run streams.
//!
//! A run's output is an append-only sequence of framed chunks. Both the
//! server (producer) and the resumable client consumer speak this format,
//! so the types and the frame codec live in one dependency-light crate.

mod error;
mod frame;
mod types;

pub use error::ProtocolError;
pub use frame::{encode_frame, FrameDecoder};
pub use types::*;

/// Response header carrying the run identifier on the start endpoint.
pub const RUN_ID_HEADER: &str = "x-run-id";
