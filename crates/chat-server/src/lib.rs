//! Chat server: resumable generation runs over HTTP.
//!
//! `POST /v1/runs` appends the user's message, spawns a run against the
//! upstream gateway, and streams chunks back. The run id header lets a
//! disconnected client reattach at `GET /v1/runs/:run_id/stream` with the
//! index of the next chunk it needs; the run itself keeps executing and
//! billing regardless of who is watching.

pub mod api;
pub mod config;
pub mod error;

pub use config::Config;
pub use error::ServerError;
