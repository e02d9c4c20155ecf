//! API request and response types.

use credit_ledger::Account;
use serde::{Deserialize, Serialize};

/// Body for `POST /v1/runs`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRunRequest {
    pub conversation_id: String,
    pub account_id: String,
    /// The user's message for this turn.
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider_options: Option<serde_json::Value>,
}

/// Query for `GET /v1/runs/:run_id/stream`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeQuery {
    /// Index of the first chunk to deliver.
    #[serde(default)]
    pub start_index: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub conversations: usize,
    pub tracked_runs: usize,
}

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub account_id: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account_id: String,
    pub balance_microcents: i64,
    pub auto_reload_enabled: bool,
    pub auto_reload_threshold_microcents: Option<i64>,
    pub auto_reload_amount_microcents: Option<i64>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            account_id: account.account_id,
            balance_microcents: account.balance_microcents,
            auto_reload_enabled: account.auto_reload_enabled,
            auto_reload_threshold_microcents: account.auto_reload_threshold_microcents,
            auto_reload_amount_microcents: account.auto_reload_amount_microcents,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub amount_microcents: i64,
    #[serde(default = "default_credit_reason")]
    pub reason: String,
    #[serde(default)]
    pub external_source: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

fn default_credit_reason() -> String {
    "deposit".into()
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub entry_id: String,
    pub amount_microcents: i64,
    pub balance_after_microcents: i64,
    pub replayed: bool,
}

#[derive(Debug, Deserialize)]
pub struct AutoReloadRequest {
    pub enabled: bool,
    #[serde(default)]
    pub threshold_microcents: Option<i64>,
    #[serde(default)]
    pub amount_microcents: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
}
