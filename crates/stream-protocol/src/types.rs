//! Chunk and usage types shared between server and client.

use serde::{Deserialize, Serialize};

/// One framed event in a run's output stream.
///
/// Chunks have an implicit, monotonically increasing sequence position
/// within a run; the position is assigned by the server-side buffer, not
/// carried on the wire. The tag set is closed: an unknown `type` fails
/// deserialization instead of passing through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chunk {
    /// First chunk of every run; carries the stable assistant message id.
    Start { message_id: String },
    /// Incremental assistant text.
    TextDelta { text: String },
    /// Incremental tool invocation.
    ToolCallDelta {
        id: String,
        name: String,
        arguments: String,
    },
    /// Incremental reasoning text.
    ReasoningDelta { text: String },
    /// Successful end of the run.
    Finish {
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<UsageRecord>,
    },
    /// Fatal end of the run.
    Error { message: String },
}

impl Chunk {
    /// Whether this chunk ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Chunk::Finish { .. } | Chunk::Error { .. })
    }
}

/// Token usage counters for one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl UsageRecord {
    /// Build a record, resolving the total invariant: an explicit positive
    /// total wins, otherwise input + output + reasoning.
    pub fn resolve(
        input_tokens: u64,
        output_tokens: u64,
        cached_input_tokens: u64,
        reasoning_tokens: u64,
        total_tokens: Option<u64>,
    ) -> Self {
        let total = match total_tokens {
            Some(t) if t > 0 => t,
            _ => input_tokens + output_tokens + reasoning_tokens,
        };
        Self {
            input_tokens,
            output_tokens,
            cached_input_tokens,
            reasoning_tokens,
            total_tokens: total,
        }
    }

    /// Accumulate another record into this one. Used for conversation
    /// aggregates and multi-iteration tool runs.
    pub fn add(&mut self, other: &UsageRecord) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cached_input_tokens = self
            .cached_input_tokens
            .saturating_add(other.cached_input_tokens);
        self.reasoning_tokens = self.reasoning_tokens.saturating_add(other.reasoning_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }

    /// Whether any counter is non-zero.
    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0
            && self.input_tokens == 0
            && self.output_tokens == 0
            && self.reasoning_tokens == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_terminal() {
        assert!(Chunk::Finish { usage: None }.is_terminal());
        assert!(Chunk::Error {
            message: "boom".into()
        }
        .is_terminal());
        assert!(!Chunk::TextDelta {
            text: "hello".into()
        }
        .is_terminal());
        assert!(!Chunk::Start {
            message_id: "m1".into()
        }
        .is_terminal());
    }

    #[test]
    fn test_chunk_serialization_tags() {
        let json = serde_json::to_string(&Chunk::Start {
            message_id: "m1".into(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"start\""));
        assert!(json.contains("\"message_id\":\"m1\""));

        let json = serde_json::to_string(&Chunk::Finish { usage: None }).unwrap();
        assert_eq!(json, "{\"type\":\"finish\"}");
    }

    #[test]
    fn test_chunk_rejects_unknown_tag() {
        let result = serde_json::from_str::<Chunk>(r#"{"type":"telemetry","payload":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_usage_resolve_explicit_total_wins() {
        let usage = UsageRecord::resolve(10, 20, 5, 3, Some(40));
        assert_eq!(usage.total_tokens, 40);
    }

    #[test]
    fn test_usage_resolve_computed_total() {
        let usage = UsageRecord::resolve(10, 20, 5, 3, None);
        assert_eq!(usage.total_tokens, 33);

        // A zero explicit total is treated as absent.
        let usage = UsageRecord::resolve(10, 20, 0, 0, Some(0));
        assert_eq!(usage.total_tokens, 30);
    }

    #[test]
    fn test_usage_add() {
        let mut a = UsageRecord::resolve(10, 20, 1, 2, None);
        let b = UsageRecord::resolve(5, 5, 1, 0, None);
        a.add(&b);
        assert_eq!(a.input_tokens, 15);
        assert_eq!(a.output_tokens, 25);
        assert_eq!(a.cached_input_tokens, 2);
        assert_eq!(a.reasoning_tokens, 2);
        assert_eq!(a.total_tokens, 42);
    }
}
