//! HTTP API for the chat server.

mod handlers;
mod types;

pub use handlers::*;
pub use types::*;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use credit_ledger::CreditLedger;
use generation_runner::{ChunkBuffer, GenerationRunner};
use message_store::MessageStore;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Run executor
    pub runner: Arc<GenerationRunner>,
    /// Chunk history for resumable streams
    pub buffer: ChunkBuffer,
    /// Conversation/message store
    pub messages: MessageStore,
    /// Account ledger
    pub ledger: Arc<CreditLedger>,
}

impl AppState {
    /// Create new application state. The buffer is shared with the runner.
    pub fn new(
        runner: GenerationRunner,
        messages: MessageStore,
        ledger: Arc<CreditLedger>,
    ) -> Self {
        let buffer = runner.buffer().clone();
        Self {
            runner: Arc::new(runner),
            buffer,
            messages,
            ledger,
        }
    }
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Runs
        .route("/v1/runs", post(handlers::start_run))
        .route("/v1/runs/:run_id/stream", get(handlers::resume_stream))
        // Conversations
        .route(
            "/v1/conversations/:conversation_id",
            get(handlers::get_conversation),
        )
        .route(
            "/v1/conversations/:conversation_id",
            delete(handlers::clear_conversation),
        )
        // Accounts and billing
        .route("/v1/accounts", post(handlers::open_account))
        .route("/v1/accounts/:account_id", get(handlers::get_account))
        .route("/v1/accounts/:account_id/credits", post(handlers::add_credits))
        .route("/v1/accounts/:account_id/entries", get(handlers::list_entries))
        .route(
            "/v1/accounts/:account_id/auto-reload",
            put(handlers::configure_auto_reload),
        )
        .route(
            "/v1/accounts/:account_id/reload-decision",
            get(handlers::reload_decision),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
