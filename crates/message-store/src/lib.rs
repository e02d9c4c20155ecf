//! In-memory message and conversation storage with TTL expiration.
//!
//! Persistence collaborator for the generation runner: placeholder
//! assistant messages at run start, usage/cost finalization once the
//! generation completes, and additive conversation-level usage counters.

mod error;
mod store;
mod types;

pub use error::MessageStoreError;
pub use store::MessageStore;
pub use types::*;
