//! Durable, step-based execution of one model generation.
//!
//! A run is a fixed sequence of named steps: emit-start, stream-generation,
//! persist-usage, update-aggregate-usage, debit-ledger. Each step is
//! idempotent on its own, and a per-run journal records which steps have
//! completed so a process restart resumes at the right place without
//! minting a second message id or billing twice.

mod buffer;
mod error;
mod journal;
mod runner;
mod types;

pub use buffer::{BufferConfig, ChunkBuffer};
pub use error::RunnerError;
pub use journal::{RunJournal, StepName};
pub use runner::{GenerationRunner, RunnerConfig};
pub use types::*;
