//! Conversation and message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stream_protocol::UsageRecord;

/// A single stored message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Stable message id. Assistant messages receive theirs at run start.
    pub id: String,
    /// "user" or "assistant".
    pub role: String,
    pub content: Option<String>,
    /// Final token usage, written after the generation completes.
    pub usage: Option<UsageRecord>,
    /// Final cost in microcents.
    pub cost_microcents: Option<i64>,
    /// Provider-reported generation id; the billing idempotency anchor.
    pub provider_generation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(role: impl Into<String>, content: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: role.into(),
            content,
            usage: None,
            cost_microcents: None,
            provider_generation_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An assistant message awaiting its generation output.
    pub fn placeholder(message_id: impl Into<String>) -> Self {
        let mut message = Self::new("assistant", None);
        message.id = message_id.into();
        message
    }
}

/// A conversation with running usage aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub messages: Vec<StoredMessage>,
    /// Sum of usage across all generations in this conversation.
    pub usage_totals: UsageRecord,
    /// Sum of generation costs in microcents.
    pub cost_total_microcents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            usage_totals: UsageRecord::default(),
            cost_total_microcents: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_message(&mut self, message: StoredMessage) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Keep only the most recent `max` messages.
    pub fn trim(&mut self, max: usize) {
        if self.messages.len() > max {
            let excess = self.messages.len() - max;
            self.messages.drain(..excess);
        }
    }
}
