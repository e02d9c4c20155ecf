//! Per-run progress journal.
//!
//! One JSON file per run, written atomically (tmp file + rename). The
//! journal is the durable record of which steps completed and of the
//! values later steps depend on: the minted message id, accumulated
//! usage, the reported cost, and the provider generation id.

use crate::error::RunnerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stream_protocol::UsageRecord;
use tokio::fs;
use tracing::debug;

/// Named steps of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    EmitStart,
    StreamGeneration,
    PersistUsage,
    UpdateAggregateUsage,
    DebitLedger,
}

/// Serialized journal contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalState {
    pub run_id: String,
    /// Steps completed so far, in completion order.
    pub completed: Vec<StepName>,
    /// Stable assistant message id, minted once by emit-start.
    pub message_id: Option<String>,
    pub usage: Option<UsageRecord>,
    pub reported_cost: Option<f64>,
    pub generation_id: Option<String>,
    /// Whether the run has reached a terminal chunk.
    pub terminal: bool,
    pub updated_at: DateTime<Utc>,
}

impl JournalState {
    fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            completed: Vec::new(),
            message_id: None,
            usage: None,
            reported_cost: None,
            generation_id: None,
            terminal: false,
            updated_at: Utc::now(),
        }
    }
}

/// Durable progress marker for one run.
pub struct RunJournal {
    path: PathBuf,
    state: JournalState,
}

impl RunJournal {
    /// Open the journal for a run, loading existing state if present.
    pub async fn open(dir: &Path, run_id: &str) -> Result<Self, RunnerError> {
        let path = dir.join(format!("{}.json", run_id));

        let state = match fs::read(&path).await {
            Ok(bytes) => {
                let state: JournalState = serde_json::from_slice(&bytes)?;
                debug!(
                    "Resuming journal for run {} ({} steps complete)",
                    run_id,
                    state.completed.len()
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => JournalState::new(run_id),
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, state })
    }

    pub fn state(&self) -> &JournalState {
        &self.state
    }

    pub fn is_complete(&self, step: StepName) -> bool {
        self.state.completed.contains(&step)
    }

    /// Record a completed step and persist.
    pub async fn record_step(&mut self, step: StepName) -> Result<(), RunnerError> {
        if !self.state.completed.contains(&step) {
            self.state.completed.push(step);
        }
        self.persist().await
    }

    /// Record the minted message id and persist. The id is written before
    /// any side effect that uses it, so a crash cannot lose it.
    pub async fn set_message_id(&mut self, message_id: &str) -> Result<(), RunnerError> {
        self.state.message_id = Some(message_id.to_string());
        self.persist().await
    }

    /// Record the generation results the billing steps depend on.
    pub async fn set_generation(
        &mut self,
        usage: UsageRecord,
        reported_cost: Option<f64>,
        generation_id: Option<&str>,
    ) -> Result<(), RunnerError> {
        self.state.usage = Some(usage);
        self.state.reported_cost = reported_cost;
        self.state.generation_id = generation_id.map(String::from);
        self.persist().await
    }

    /// Mark the run terminal and persist.
    pub async fn set_terminal(&mut self) -> Result<(), RunnerError> {
        self.state.terminal = true;
        self.persist().await
    }

    async fn persist(&mut self) -> Result<(), RunnerError> {
        self.state.updated_at = Utc::now();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(&self.state)?;

        // Atomic write: a crash mid-write never leaves a torn journal.
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, &self.path).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_new_journal_is_empty() {
        let dir = TempDir::new().unwrap();
        let journal = RunJournal::open(dir.path(), "run-1").await.unwrap();

        assert!(journal.state().completed.is_empty());
        assert!(journal.state().message_id.is_none());
        assert!(!journal.is_complete(StepName::EmitStart));
    }

    #[tokio::test]
    async fn test_journal_roundtrip() {
        let dir = TempDir::new().unwrap();

        {
            let mut journal = RunJournal::open(dir.path(), "run-1").await.unwrap();
            journal.set_message_id("msg-1").await.unwrap();
            journal.record_step(StepName::EmitStart).await.unwrap();
            journal
                .set_generation(
                    UsageRecord::resolve(10, 5, 0, 0, None),
                    Some(0.02),
                    Some("gen-1"),
                )
                .await
                .unwrap();
            journal.record_step(StepName::StreamGeneration).await.unwrap();
        }

        let journal = RunJournal::open(dir.path(), "run-1").await.unwrap();
        assert!(journal.is_complete(StepName::EmitStart));
        assert!(journal.is_complete(StepName::StreamGeneration));
        assert!(!journal.is_complete(StepName::DebitLedger));
        assert_eq!(journal.state().message_id.as_deref(), Some("msg-1"));
        assert_eq!(journal.state().reported_cost, Some(0.02));
        assert_eq!(journal.state().generation_id.as_deref(), Some("gen-1"));
        assert_eq!(journal.state().usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn test_record_step_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut journal = RunJournal::open(dir.path(), "run-1").await.unwrap();

        journal.record_step(StepName::EmitStart).await.unwrap();
        journal.record_step(StepName::EmitStart).await.unwrap();

        assert_eq!(journal.state().completed.len(), 1);
    }

    #[tokio::test]
    async fn test_journals_are_isolated_by_run_id() {
        let dir = TempDir::new().unwrap();

        let mut a = RunJournal::open(dir.path(), "run-a").await.unwrap();
        a.record_step(StepName::EmitStart).await.unwrap();

        let b = RunJournal::open(dir.path(), "run-b").await.unwrap();
        assert!(!b.is_complete(StepName::EmitStart));
    }

    #[test]
    fn test_step_name_serialization() {
        let json = serde_json::to_string(&StepName::EmitStart).unwrap();
        assert_eq!(json, "\"emit-start\"");
        let json = serde_json::to_string(&StepName::UpdateAggregateUsage).unwrap();
        assert_eq!(json, "\"update-aggregate-usage\"");
    }
}
