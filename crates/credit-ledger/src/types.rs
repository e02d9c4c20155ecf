//! Core types for the credit ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a billable account.
pub type AccountId = String;

/// A billable account. The balance is mutated only by applying a
/// [`LedgerEntry`]; it is never written directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    /// Current balance in microcents.
    pub balance_microcents: i64,
    /// Whether automatic reload is enabled for this account.
    pub auto_reload_enabled: bool,
    /// Balance at or below which a reload should trigger.
    pub auto_reload_threshold_microcents: Option<i64>,
    /// Amount to reload when triggered.
    pub auto_reload_amount_microcents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new zero-balance account.
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            balance_microcents: 0,
            auto_reload_enabled: false,
            auto_reload_threshold_microcents: None,
            auto_reload_amount_microcents: None,
            created_at: Utc::now(),
        }
    }
}

/// Kind of balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Credit,
    Debit,
    Adjustment,
    Refund,
}

/// Idempotency key for an externally-driven mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalRef {
    pub source: String,
    pub id: String,
}

impl ExternalRef {
    pub fn new(source: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
        }
    }
}

/// Immutable record of a single balance mutation.
///
/// Replaying all entries for an account in creation order reconstructs the
/// current balance exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry id.
    pub id: String,
    pub account_id: AccountId,
    /// Signed amount in microcents (negative for debits).
    pub amount_microcents: i64,
    pub entry_type: EntryType,
    /// Human-readable reason, e.g. "generation".
    pub reason: String,
    pub external_source: Option<String>,
    pub external_id: Option<String>,
    /// Balance after this entry was applied.
    pub balance_after_microcents: i64,
    pub created_at: DateTime<Utc>,
}

/// Result of a ledger mutation.
#[derive(Debug, Clone)]
pub struct LedgerReceipt {
    pub entry: LedgerEntry,
    /// True when the external reference had already been applied and the
    /// original entry was returned without re-mutating the balance.
    pub replayed: bool,
}

impl LedgerReceipt {
    pub fn balance_after(&self) -> i64 {
        self.entry.balance_after_microcents
    }
}

/// Why an auto-reload decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadReason {
    Disabled,
    MissingConfig,
    AboveThreshold,
    BelowThreshold,
}

/// Outcome of evaluating the auto-reload rule for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadDecision {
    pub should_reload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_microcents: Option<i64>,
    pub reason: ReloadReason,
}

/// Decide whether an account should auto-reload. Pure function of account
/// state; performing the reload is the caller's business.
pub fn evaluate_auto_reload(account: &Account) -> ReloadDecision {
    if !account.auto_reload_enabled {
        return ReloadDecision {
            should_reload: false,
            amount_microcents: None,
            reason: ReloadReason::Disabled,
        };
    }

    let (threshold, amount) = match (
        account.auto_reload_threshold_microcents,
        account.auto_reload_amount_microcents,
    ) {
        (Some(t), Some(a)) if a > 0 => (t, a),
        _ => {
            return ReloadDecision {
                should_reload: false,
                amount_microcents: None,
                reason: ReloadReason::MissingConfig,
            }
        }
    };

    if account.balance_microcents > threshold {
        return ReloadDecision {
            should_reload: false,
            amount_microcents: None,
            reason: ReloadReason::AboveThreshold,
        };
    }

    ReloadDecision {
        should_reload: true,
        amount_microcents: Some(amount),
        reason: ReloadReason::BelowThreshold,
    }
}

/// Monetary breakdown of one generation, in microcents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub base_microcents: i64,
    pub markup_microcents: i64,
    pub total_microcents: i64,
}
