//! In-memory message store with TTL expiration.

use crate::error::MessageStoreError;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stream_protocol::UsageRecord;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

struct ConversationEntry {
    conversation: Conversation,
    expires_at: Instant,
}

struct StoreInner {
    conversations: HashMap<String, ConversationEntry>,
    /// message id -> conversation id, so finalization does not scan.
    message_index: HashMap<String, String>,
}

/// In-memory conversation/message store with automatic TTL expiration.
#[derive(Clone)]
pub struct MessageStore {
    inner: Arc<RwLock<StoreInner>>,
    max_messages: usize,
    ttl: Duration,
}

impl MessageStore {
    /// Create a new store. Spawns a background task that periodically
    /// removes expired conversations.
    pub fn new(max_messages: usize, ttl: Duration) -> Self {
        let store = Self {
            inner: Arc::new(RwLock::new(StoreInner {
                conversations: HashMap::new(),
                message_index: HashMap::new(),
            })),
            max_messages,
            ttl,
        };

        let cleanup_store = store.clone();
        tokio::spawn(async move {
            cleanup_store.cleanup_loop().await;
        });

        info!(
            "Message store initialized (max_messages={}, ttl={:?})",
            max_messages, ttl
        );

        store
    }

    async fn cleanup_loop(&self) {
        let cleanup_interval = Duration::from_secs(60);

        loop {
            tokio::time::sleep(cleanup_interval).await;

            let now = Instant::now();
            let mut inner = self.inner.write().await;
            let before_count = inner.conversations.len();

            let expired: Vec<String> = inner
                .conversations
                .iter()
                .filter(|(_, entry)| entry.expires_at <= now)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &expired {
                if let Some(entry) = inner.conversations.remove(id) {
                    for message in &entry.conversation.messages {
                        inner.message_index.remove(&message.id);
                    }
                }
            }

            let removed = before_count - inner.conversations.len();
            if removed > 0 {
                debug!("Cleaned up {} expired conversations", removed);
            }
        }
    }

    /// Get a conversation snapshot.
    #[instrument(skip(self))]
    pub async fn get(&self, conversation_id: &str) -> Option<Conversation> {
        let inner = self.inner.read().await;
        let now = Instant::now();
        inner
            .conversations
            .get(conversation_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.conversation.clone())
    }

    /// Append a user message, creating the conversation if needed.
    #[instrument(skip(self, text))]
    pub async fn append_user_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> StoredMessage {
        let message = StoredMessage::new("user", Some(text.to_string()));
        self.insert_message(conversation_id, message.clone()).await;
        message
    }

    /// Create the assistant placeholder row for a run. Idempotent: calling
    /// again with the same message id returns the existing row unchanged,
    /// so a re-executed emit-start step never duplicates.
    #[instrument(skip(self))]
    pub async fn create_assistant_placeholder(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> StoredMessage {
        {
            let inner = self.inner.read().await;
            if let Some(existing) = find_message(&inner, message_id) {
                debug!("Placeholder {} already exists", message_id);
                return existing;
            }
        }
        let message = StoredMessage::placeholder(message_id);
        self.insert_message(conversation_id, message.clone()).await;
        message
    }

    /// Write final usage, cost, and the provider generation id against a
    /// message. Fails with [`MessageStoreError::MessageNotFound`] if the
    /// row is absent; callers retry with bounded backoff.
    #[instrument(skip(self, content, usage))]
    pub async fn finalize_message(
        &self,
        message_id: &str,
        content: Option<&str>,
        usage: UsageRecord,
        cost_microcents: Option<i64>,
        provider_generation_id: Option<&str>,
    ) -> Result<StoredMessage, MessageStoreError> {
        let mut inner = self.inner.write().await;

        let conversation_id = inner
            .message_index
            .get(message_id)
            .cloned()
            .ok_or_else(|| MessageStoreError::MessageNotFound(message_id.to_string()))?;

        let entry = inner
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| MessageStoreError::MessageNotFound(message_id.to_string()))?;

        let message = entry
            .conversation
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| MessageStoreError::MessageNotFound(message_id.to_string()))?;

        if let Some(content) = content {
            message.content = Some(content.to_string());
        }
        message.usage = Some(usage);
        message.cost_microcents = cost_microcents;
        message.provider_generation_id = provider_generation_id.map(String::from);
        message.updated_at = chrono::Utc::now();
        let snapshot = message.clone();
        entry.conversation.updated_at = snapshot.updated_at;

        debug!("Finalized message {} ({} tokens)", message_id, usage.total_tokens);
        Ok(snapshot)
    }

    /// Add usage deltas into the conversation's running counters. Additive
    /// and commutative, so retries and reordering are harmless at the
    /// counter level.
    #[instrument(skip(self, usage))]
    pub async fn add_conversation_usage(
        &self,
        conversation_id: &str,
        usage: &UsageRecord,
        cost_microcents: i64,
    ) -> Result<Conversation, MessageStoreError> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| MessageStoreError::ConversationNotFound(conversation_id.to_string()))?;

        entry.conversation.usage_totals.add(usage);
        entry.conversation.cost_total_microcents += cost_microcents;
        entry.conversation.updated_at = chrono::Utc::now();
        Ok(entry.conversation.clone())
    }

    /// Delete a conversation. Returns whether anything was removed.
    #[instrument(skip(self))]
    pub async fn clear(&self, conversation_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.conversations.remove(conversation_id) {
            Some(entry) => {
                for message in &entry.conversation.messages {
                    inner.message_index.remove(&message.id);
                }
                info!("Cleared conversation {}", conversation_id);
                true
            }
            None => false,
        }
    }

    /// Number of live conversations.
    pub async fn conversation_count(&self) -> usize {
        let inner = self.inner.read().await;
        let now = Instant::now();
        inner
            .conversations
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    async fn insert_message(&self, conversation_id: &str, message: StoredMessage) {
        let mut inner = self.inner.write().await;
        let expires_at = Instant::now() + self.ttl;

        inner
            .message_index
            .insert(message.id.clone(), conversation_id.to_string());

        let entry = inner
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| ConversationEntry {
                conversation: Conversation::new(conversation_id),
                expires_at,
            });

        // Refresh expiration on activity.
        entry.expires_at = expires_at;
        entry.conversation.push_message(message);

        let max = self.max_messages;
        if entry.conversation.messages.len() > max {
            let dropped: Vec<String> = entry
                .conversation
                .messages
                .iter()
                .take(entry.conversation.messages.len() - max)
                .map(|m| m.id.clone())
                .collect();
            entry.conversation.trim(max);
            for id in dropped {
                inner.message_index.remove(&id);
            }
        }
    }

}

fn find_message(inner: &StoreInner, message_id: &str) -> Option<StoredMessage> {
    let conversation_id = inner.message_index.get(message_id)?;
    inner
        .conversations
        .get(conversation_id)?
        .conversation
        .messages
        .iter()
        .find(|m| m.id == message_id)
        .cloned()
}
