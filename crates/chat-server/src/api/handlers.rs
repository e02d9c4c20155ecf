//! HTTP request handlers.

use super::types::{
    AccountResponse, AutoReloadRequest, ClearResponse, CreditRequest, HealthResponse,
    OpenAccountRequest, ReceiptResponse, ResumeQuery, StartRunRequest,
};
use super::AppState;
use crate::error::ServerError;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::Response;
use axum::Json;
use credit_ledger::{ExternalRef, LedgerEntry, LedgerReceipt, ReloadDecision};
use futures::stream::BoxStream;
use futures::StreamExt;
use generation_runner::RunRequest;
use message_store::Conversation;
use model_gateway::ChatMessage;
use stream_protocol::{encode_frame, Chunk, RUN_ID_HEADER};
use tracing::{info, warn};

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        conversations: state.messages.conversation_count().await,
        tracked_runs: state.buffer.run_count().await,
    })
}

/// Start a generation run and stream its chunks.
///
/// The run executes in a detached task; the response body follows the
/// chunk buffer, so a dropped connection never kills the run. The run id
/// header lets the client reconnect to the stream endpoint.
pub async fn start_run(
    State(state): State<AppState>,
    Json(request): Json<StartRunRequest>,
) -> Result<Response, ServerError> {
    if request.message.trim().is_empty() {
        return Err(ServerError::InvalidRequest("message must not be empty".into()));
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    info!(
        "Starting run {} for conversation {}",
        run_id, request.conversation_id
    );

    state
        .messages
        .append_user_message(&request.conversation_id, &request.message)
        .await;
    let conversation = state
        .messages
        .get(&request.conversation_id)
        .await
        .ok_or_else(|| ServerError::Internal("conversation vanished after append".into()))?;

    let mut run_request = RunRequest::new(
        run_id.clone(),
        request.conversation_id,
        request.account_id,
        chat_history(&conversation),
    );
    run_request.model = request.model;
    run_request.provider_options = request.provider_options;

    // Register before spawning so the response can attach immediately.
    state.buffer.register(&run_id).await;

    let runner = state.runner.clone();
    let task_run_id = run_id.clone();
    tokio::spawn(async move {
        if let Err(e) = runner.execute(run_request).await {
            warn!("Run {} failed: {}", task_run_id, e);
        }
    });

    let stream = state
        .buffer
        .stream_from(&run_id, 0)
        .await
        .ok_or_else(|| ServerError::UnknownRun(run_id.clone()))?;
    sse_response(&run_id, stream)
}

/// Reattach to a run's stream, replaying from the requested index.
pub async fn resume_stream(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<ResumeQuery>,
) -> Result<Response, ServerError> {
    let stream = state
        .buffer
        .stream_from(&run_id, query.start_index)
        .await
        .ok_or_else(|| ServerError::UnknownRun(run_id.clone()))?;
    sse_response(&run_id, stream)
}

/// Get a conversation snapshot.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Conversation>, ServerError> {
    state
        .messages
        .get(&conversation_id)
        .await
        .map(Json)
        .ok_or(ServerError::ConversationNotFound(conversation_id))
}

/// Delete a conversation.
pub async fn clear_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<ClearResponse> {
    let cleared = state.messages.clear(&conversation_id).await;
    Json(ClearResponse { cleared })
}

/// Open a new account.
pub async fn open_account(
    State(state): State<AppState>,
    Json(request): Json<OpenAccountRequest>,
) -> Result<Json<AccountResponse>, ServerError> {
    let account = state.ledger.open_account(&request.account_id).await?;
    Ok(Json(account.into()))
}

/// Account snapshot with balance.
pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<AccountResponse>, ServerError> {
    let account = state.ledger.get_account(&account_id).await?;
    Ok(Json(account.into()))
}

/// Add credits to an account.
pub async fn add_credits(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(request): Json<CreditRequest>,
) -> Result<Json<ReceiptResponse>, ServerError> {
    let external = match (request.external_source, request.external_id) {
        (Some(source), Some(id)) => Some(ExternalRef::new(source, id)),
        (None, None) => None,
        _ => {
            return Err(ServerError::InvalidRequest(
                "external_source and external_id must be provided together".into(),
            ))
        }
    };

    let receipt = state
        .ledger
        .credit(&account_id, request.amount_microcents, &request.reason, external)
        .await?;
    Ok(Json(receipt_response(receipt)))
}

/// Ledger entries for an account, oldest first.
pub async fn list_entries(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<LedgerEntry>>, ServerError> {
    Ok(Json(state.ledger.entries(&account_id).await?))
}

/// Update auto-reload settings.
pub async fn configure_auto_reload(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(request): Json<AutoReloadRequest>,
) -> Result<Json<AccountResponse>, ServerError> {
    let account = state
        .ledger
        .configure_auto_reload(
            &account_id,
            request.enabled,
            request.threshold_microcents,
            request.amount_microcents,
        )
        .await?;
    Ok(Json(account.into()))
}

/// Evaluate the auto-reload rule for an account.
pub async fn reload_decision(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<ReloadDecision>, ServerError> {
    Ok(Json(state.ledger.reload_decision(&account_id).await?))
}

fn receipt_response(receipt: LedgerReceipt) -> ReceiptResponse {
    ReceiptResponse {
        entry_id: receipt.entry.id.clone(),
        amount_microcents: receipt.entry.amount_microcents,
        balance_after_microcents: receipt.balance_after(),
        replayed: receipt.replayed,
    }
}

/// Frame a chunk stream as an event-stream response with the run id header.
fn sse_response(
    run_id: &str,
    stream: BoxStream<'static, Chunk>,
) -> Result<Response, ServerError> {
    let body = Body::from_stream(
        stream.map(|chunk| encode_frame(&chunk).map_err(axum::BoxError::from)),
    );

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(RUN_ID_HEADER, run_id)
        .body(body)
        .map_err(|e| ServerError::Internal(e.to_string()))
}

/// Project stored messages into gateway chat messages. Rows without
/// content (unfinished placeholders) are skipped.
fn chat_history(conversation: &Conversation) -> Vec<ChatMessage> {
    conversation
        .messages
        .iter()
        .filter_map(|message| {
            let content = message.content.clone()?;
            match message.role.as_str() {
                "system" => Some(ChatMessage::system(content)),
                "user" => Some(ChatMessage::user(content)),
                "assistant" => Some(ChatMessage::assistant(content)),
                _ => None,
            }
        })
        .collect()
}
