//! Resumable run client.
//!
//! Starts a run with one POST, then consumes the chunk stream with
//! automatic reconnection: every reconnect asks the server to replay
//! from the index after the last chunk actually delivered, so the
//! consumer sees each chunk exactly once regardless of how many times
//! the connection drops. A circuit breaker aborts after too many
//! consecutive failures without progress; any delivered chunk resets it.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use stream_protocol::{Chunk, FrameDecoder, ProtocolError, RUN_ID_HEADER};
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::error::TransportError;

/// Reconnection policy.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Consecutive failed connections tolerated before giving up. The
    /// counter resets whenever a chunk is delivered.
    pub max_consecutive_failures: u32,
    /// Connect timeout for each attempt.
    pub connect_timeout: Duration,
    /// Fixed delay before each reconnect.
    pub reconnect_backoff: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            connect_timeout: Duration::from_secs(10),
            reconnect_backoff: Duration::from_millis(250),
        }
    }
}

/// Client for starting and consuming resumable runs.
#[derive(Clone)]
pub struct StreamTransport {
    client: Client,
    base_url: String,
    config: TransportConfig,
}

impl StreamTransport {
    pub fn new(base_url: impl Into<String>, config: TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            config,
        })
    }

    /// Start a new run and attach to its stream.
    ///
    /// The response must carry the run id header; its absence is a
    /// protocol error and is never retried.
    #[instrument(skip(self, body))]
    pub async fn start_run(&self, body: serde_json::Value) -> Result<RunStream, TransportError> {
        let response = self
            .client
            .post(format!("{}/v1/runs", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let run_id = response
            .headers()
            .get(RUN_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or(ProtocolError::MissingRunId)?;

        debug!("Started run {}", run_id);
        Ok(self.attach(run_id, 0, Some(response)))
    }

    /// Attach to an existing run, replaying from `start_index`.
    pub fn resume_run(&self, run_id: impl Into<String>, start_index: u64) -> RunStream {
        self.attach(run_id.into(), start_index, None)
    }

    fn attach(&self, run_id: String, delivered: u64, initial: Option<reqwest::Response>) -> RunStream {
        let (cancel_tx, _) = watch::channel(false);
        RunStream {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            config: self.config.clone(),
            run_id,
            delivered,
            initial,
            cancel: Arc::new(cancel_tx),
        }
    }
}

/// Cancels a [`RunStream`] from another task.
#[derive(Clone)]
pub struct CancelHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // Receivers may already be gone; cancellation is best-effort.
        let _ = self.cancel.send(true);
    }
}

/// One attached run stream.
pub struct RunStream {
    client: Client,
    base_url: String,
    config: TransportConfig,
    run_id: String,
    delivered: u64,
    initial: Option<reqwest::Response>,
    cancel: Arc<watch::Sender<bool>>,
}

impl RunStream {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Consume the stream, reconnecting as needed until a terminal chunk.
    ///
    /// The stream ends after yielding the terminal chunk, or with a single
    /// error when retries are exhausted, cancellation is requested, or the
    /// server breaks the framing protocol.
    pub fn into_stream(self) -> BoxStream<'static, Result<Chunk, TransportError>> {
        let RunStream {
            client,
            base_url,
            config,
            run_id,
            mut delivered,
            mut initial,
            cancel,
        } = self;
        let mut cancel_rx = cancel.subscribe();

        let stream = async_stream::stream! {
            // Hold the sender so dropping an unused cancel handle does
            // not close the watch channel under the receiver.
            let _cancel = cancel;
            let mut failures: u32 = 0;

            loop {
                if *cancel_rx.borrow() {
                    yield Err(TransportError::Cancelled);
                    return;
                }

                let response = match initial.take() {
                    Some(response) => Some(response),
                    None => {
                        let attempt = client
                            .get(format!("{}/v1/runs/{}/stream", base_url, run_id))
                            .query(&[("start_index", delivered)])
                            .send()
                            .await
                            .and_then(|r| r.error_for_status());
                        match attempt {
                            Ok(response) => Some(response),
                            Err(e) => {
                                failures += 1;
                                warn!(
                                    "Reconnect {} for run {} failed: {}",
                                    failures, run_id, e
                                );
                                if failures >= config.max_consecutive_failures {
                                    yield Err(TransportError::RetriesExhausted {
                                        attempts: failures,
                                    });
                                    return;
                                }
                                tokio::select! {
                                    biased;
                                    _ = cancel_rx.changed() => {
                                        yield Err(TransportError::Cancelled);
                                        return;
                                    }
                                    _ = tokio::time::sleep(config.reconnect_backoff) => {}
                                }
                                None
                            }
                        }
                    }
                };
                let Some(response) = response else {
                    continue;
                };

                let mut decoder: FrameDecoder = FrameDecoder::new();
                let mut bytes = response.bytes_stream();

                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel_rx.changed() => {
                            yield Err(TransportError::Cancelled);
                            return;
                        }
                        next = bytes.next() => next,
                    };

                    match next {
                        Some(Ok(buf)) => {
                            let chunks = match decoder.feed(&buf) {
                                Ok(chunks) => chunks,
                                Err(e) => {
                                    yield Err(e.into());
                                    return;
                                }
                            };
                            for chunk in chunks {
                                let terminal = chunk.is_terminal();
                                delivered += 1;
                                failures = 0;
                                yield Ok(chunk);
                                if terminal {
                                    return;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            debug!("Stream for run {} broke mid-body: {}", run_id, e);
                            break;
                        }
                        // EOF without a terminal chunk: the server went
                        // away mid-run; reconnect and replay the tail.
                        None => break,
                    }
                }

                failures += 1;
                if failures >= config.max_consecutive_failures {
                    yield Err(TransportError::RetriesExhausted { attempts: failures });
                    return;
                }
                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => {
                        yield Err(TransportError::Cancelled);
                        return;
                    }
                    _ = tokio::time::sleep(config.reconnect_backoff) => {}
                }
            }
        };

        Box::pin(stream)
    }
}
