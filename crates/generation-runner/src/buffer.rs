//! In-memory chunk history for resumable streaming.
//!
//! Every chunk a run produces is appended here under the run id, so a
//! client that reconnects can replay from any index and then follow the
//! live tail. Entries for finished runs are evicted after a TTL; a run
//! that is still producing chunks is never evicted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RunnerError;
use futures::stream::BoxStream;
use stream_protocol::Chunk;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Buffer retention settings.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Soft cap on tracked runs; finished runs are evicted first when over.
    pub max_runs: usize,
    /// How long a finished run's chunks stay replayable.
    pub terminal_ttl: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_runs: 1000,
            terminal_ttl: Duration::from_secs(300),
        }
    }
}

struct RunEntry {
    chunks: Vec<Chunk>,
    terminal: bool,
    finished_at: Option<Instant>,
    /// Version counter bumped on every append; followers wait on it.
    notify: watch::Sender<u64>,
}

impl RunEntry {
    fn new() -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            chunks: Vec::new(),
            terminal: false,
            finished_at: None,
            notify,
        }
    }
}

/// Shared chunk history keyed by run id.
#[derive(Clone)]
pub struct ChunkBuffer {
    runs: Arc<RwLock<HashMap<String, RunEntry>>>,
    config: BufferConfig,
}

impl ChunkBuffer {
    pub fn new(config: BufferConfig) -> Self {
        let buffer = Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            config,
        };

        let cleanup = buffer.clone();
        tokio::spawn(async move {
            cleanup.cleanup_loop().await;
        });

        buffer
    }

    /// Register a run before its first chunk. Idempotent: re-registering
    /// an in-flight run keeps its existing history.
    pub async fn register(&self, run_id: &str) {
        let mut runs = self.runs.write().await;

        if runs.len() >= self.config.max_runs && !runs.contains_key(run_id) {
            evict_finished(&mut runs, self.config.max_runs);
        }

        runs.entry(run_id.to_string()).or_insert_with(RunEntry::new);
    }

    /// Append a chunk, returning its index in the run's history.
    pub async fn append(&self, run_id: &str, chunk: Chunk) -> Result<usize, RunnerError> {
        let mut runs = self.runs.write().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| RunnerError::UnknownRun(run_id.to_string()))?;

        let terminal = chunk.is_terminal();
        let index = entry.chunks.len();
        entry.chunks.push(chunk);
        if terminal {
            entry.terminal = true;
            entry.finished_at = Some(Instant::now());
        }
        entry.notify.send_modify(|version| *version += 1);

        Ok(index)
    }

    /// Whether the buffer knows this run.
    pub async fn contains(&self, run_id: &str) -> bool {
        self.runs.read().await.contains_key(run_id)
    }

    /// Whether the run has produced its terminal chunk.
    pub async fn is_terminal(&self, run_id: &str) -> Option<bool> {
        self.runs.read().await.get(run_id).map(|e| e.terminal)
    }

    /// Chunks from `start_index` onward, as currently buffered.
    pub async fn replay_from(&self, run_id: &str, start_index: usize) -> Option<Vec<Chunk>> {
        let runs = self.runs.read().await;
        let entry = runs.get(run_id)?;
        Some(
            entry
                .chunks
                .get(start_index..)
                .map(|tail| tail.to_vec())
                .unwrap_or_default(),
        )
    }

    /// Stream chunks from `start_index`, replaying buffered history and
    /// then following live appends until the terminal chunk. Returns
    /// `None` for an unknown run.
    pub async fn stream_from(
        &self,
        run_id: &str,
        start_index: usize,
    ) -> Option<BoxStream<'static, Chunk>> {
        let mut version_rx = {
            let runs = self.runs.read().await;
            runs.get(run_id)?.notify.subscribe()
        };

        let runs = self.runs.clone();
        let run_id = run_id.to_string();

        let stream = async_stream::stream! {
            let mut next = start_index;
            loop {
                let (batch, terminal) = {
                    let runs = runs.read().await;
                    match runs.get(&run_id) {
                        Some(entry) => {
                            let batch: Vec<Chunk> = entry
                                .chunks
                                .get(next..)
                                .map(|tail| tail.to_vec())
                                .unwrap_or_default();
                            (batch, entry.terminal)
                        }
                        // Evicted mid-follow; nothing more to deliver.
                        None => return,
                    }
                };

                for chunk in batch {
                    next += 1;
                    yield chunk;
                }

                if terminal {
                    return;
                }

                if version_rx.changed().await.is_err() {
                    // Sender dropped with the entry; drain whatever is left.
                    continue;
                }
            }
        };

        Some(Box::pin(stream))
    }

    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    async fn cleanup_loop(&self) {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            self.cleanup_expired().await;
        }
    }

    async fn cleanup_expired(&self) {
        let now = Instant::now();
        let ttl = self.config.terminal_ttl;
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, entry| match entry.finished_at {
            Some(finished) => now.duration_since(finished) < ttl,
            None => true,
        });
        let removed = before - runs.len();
        if removed > 0 {
            debug!("Evicted {} finished runs from chunk buffer", removed);
        }
    }
}

/// Drop finished runs, oldest first, until under `cap`.
fn evict_finished(runs: &mut HashMap<String, RunEntry>, cap: usize) {
    let mut finished: Vec<(String, Instant)> = runs
        .iter()
        .filter_map(|(id, entry)| entry.finished_at.map(|at| (id.clone(), at)))
        .collect();
    finished.sort_by_key(|(_, at)| *at);

    for (id, _) in finished {
        if runs.len() < cap {
            break;
        }
        runs.remove(&id);
    }

    if runs.len() >= cap {
        warn!("Chunk buffer over capacity with only live runs; none evicted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn text(s: &str) -> Chunk {
        Chunk::TextDelta {
            text: s.to_string(),
        }
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let buffer = ChunkBuffer::new(BufferConfig::default());
        buffer.register("run-1").await;

        assert_eq!(buffer.append("run-1", text("a")).await.unwrap(), 0);
        assert_eq!(buffer.append("run-1", text("b")).await.unwrap(), 1);

        let all = buffer.replay_from("run-1", 0).await.unwrap();
        assert_eq!(all.len(), 2);

        let tail = buffer.replay_from("run-1", 1).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert!(matches!(&tail[0], Chunk::TextDelta { text } if text == "b"));

        // Past the end is an empty replay, not an error.
        let none = buffer.replay_from("run-1", 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_append_unknown_run_fails() {
        let buffer = ChunkBuffer::new(BufferConfig::default());
        let err = buffer.append("missing", text("a")).await.unwrap_err();
        assert!(matches!(err, RunnerError::UnknownRun(_)));
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let buffer = ChunkBuffer::new(BufferConfig::default());
        buffer.register("run-1").await;
        buffer.append("run-1", text("a")).await.unwrap();
        buffer.register("run-1").await;

        assert_eq!(buffer.replay_from("run-1", 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_replays_then_follows_live() {
        let buffer = ChunkBuffer::new(BufferConfig::default());
        buffer.register("run-1").await;
        buffer.append("run-1", text("a")).await.unwrap();

        let mut stream = buffer.stream_from("run-1", 0).await.unwrap();
        assert!(matches!(
            stream.next().await,
            Some(Chunk::TextDelta { text }) if text == "a"
        ));

        let writer = buffer.clone();
        let producer = tokio::spawn(async move {
            writer.append("run-1", text("b")).await.unwrap();
            writer
                .append("run-1", Chunk::Finish { usage: None })
                .await
                .unwrap();
        });

        assert!(matches!(
            stream.next().await,
            Some(Chunk::TextDelta { text }) if text == "b"
        ));
        assert!(matches!(stream.next().await, Some(Chunk::Finish { .. })));
        assert!(stream.next().await.is_none());

        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_from_midpoint_skips_earlier_chunks() {
        let buffer = ChunkBuffer::new(BufferConfig::default());
        buffer.register("run-1").await;
        buffer.append("run-1", text("a")).await.unwrap();
        buffer.append("run-1", text("b")).await.unwrap();
        buffer
            .append("run-1", Chunk::Finish { usage: None })
            .await
            .unwrap();

        let chunks: Vec<Chunk> = buffer
            .stream_from("run-1", 1)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        assert!(matches!(&chunks[0], Chunk::TextDelta { text } if text == "b"));
        assert!(matches!(&chunks[1], Chunk::Finish { .. }));
    }

    #[tokio::test]
    async fn test_stream_unknown_run_is_none() {
        let buffer = ChunkBuffer::new(BufferConfig::default());
        assert!(buffer.stream_from("missing", 0).await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_evicts_only_finished_runs() {
        let buffer = ChunkBuffer::new(BufferConfig {
            max_runs: 10,
            terminal_ttl: Duration::from_millis(10),
        });
        buffer.register("live").await;
        buffer.append("live", text("a")).await.unwrap();

        buffer.register("done").await;
        buffer
            .append("done", Chunk::Finish { usage: None })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        buffer.cleanup_expired().await;

        assert!(buffer.contains("live").await);
        assert!(!buffer.contains("done").await);
    }

    #[tokio::test]
    async fn test_capacity_eviction_prefers_finished_runs() {
        let buffer = ChunkBuffer::new(BufferConfig {
            max_runs: 2,
            terminal_ttl: Duration::from_secs(300),
        });

        buffer.register("done").await;
        buffer
            .append("done", Chunk::Finish { usage: None })
            .await
            .unwrap();
        buffer.register("live").await;

        buffer.register("new").await;
        assert!(buffer.contains("new").await);
        assert!(buffer.contains("live").await);
        assert!(!buffer.contains("done").await);
    }
}
