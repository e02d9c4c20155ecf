//! Run request and outcome types.

use credit_ledger::PricingResult;
use model_gateway::{ChatMessage, ToolDefinition};
use serde::{Deserialize, Serialize};
use stream_protocol::UsageRecord;

/// Everything needed to execute one generation run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Run id; also the journal and chunk-buffer key.
    pub run_id: String,
    pub conversation_id: String,
    /// Account billed for this run.
    pub account_id: String,
    /// Model id; the gateway default applies when absent.
    pub model: Option<String>,
    /// Ordered input messages.
    pub messages: Vec<ChatMessage>,
    /// Opaque provider options forwarded to the gateway.
    pub provider_options: Option<serde_json::Value>,
    /// Tools offered to the model; `None` disables the tool loop.
    pub tools: Option<Vec<ToolDefinition>>,
}

impl RunRequest {
    pub fn new(
        run_id: impl Into<String>,
        conversation_id: impl Into<String>,
        account_id: impl Into<String>,
        messages: Vec<ChatMessage>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            conversation_id: conversation_id.into(),
            account_id: account_id.into(),
            model: None,
            messages,
            provider_options: None,
            tools: None,
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: String,
    /// Stable assistant message id minted by emit-start.
    pub message_id: String,
    /// Usage accumulated across all generation iterations.
    pub usage: UsageRecord,
    /// Pricing breakdown; `None` when the cost oracle reported nothing.
    pub pricing: Option<PricingResult>,
    /// Provider generation id; the billing idempotency anchor.
    pub generation_id: Option<String>,
}
