//! Step-based execution of one generation run.
//!
//! A run walks five steps in order: emit-start, stream-generation,
//! persist-usage, update-aggregate-usage, debit-ledger. A generation
//! failure aborts the run before any billing step executes; once the
//! generation has streamed to the client, bookkeeping failures are
//! logged and swallowed so the delivered response is never retracted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use credit_ledger::{CreditLedger, ExternalRef, PricingCalculator, PricingResult, ReloadReason};
use futures::StreamExt;
use message_store::MessageStore;
use model_gateway::{
    GatewayEvent, GatewayRequest, GenerationGateway, ToolCall, ToolRunner,
};
use stream_protocol::{Chunk, UsageRecord};
use tracing::{debug, info, instrument, warn};

use crate::buffer::ChunkBuffer;
use crate::error::RunnerError;
use crate::journal::{RunJournal, StepName};
use crate::types::{RunOutcome, RunRequest};

/// Runner tuning knobs.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Upper bound on generation iterations driven by tool calls.
    pub max_tool_steps: usize,
    /// Attempts for the persist-usage write before giving up.
    pub usage_persist_attempts: u32,
    /// Delay between persist-usage attempts.
    pub usage_persist_backoff: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_tool_steps: 5,
            usage_persist_attempts: 3,
            usage_persist_backoff: Duration::from_millis(250),
        }
    }
}

/// What one pass of the generation loop produced.
struct GenerationResult {
    content: String,
    usage: UsageRecord,
    reported_cost: Option<f64>,
    generation_id: Option<String>,
}

/// Executes generation runs against the gateway, recording progress in a
/// per-run journal so a restarted process resumes instead of repeating
/// side effects.
pub struct GenerationRunner {
    gateway: Arc<dyn GenerationGateway>,
    messages: MessageStore,
    ledger: Arc<CreditLedger>,
    pricing: PricingCalculator,
    buffer: ChunkBuffer,
    tools: Option<Arc<dyn ToolRunner>>,
    journal_dir: PathBuf,
    config: RunnerConfig,
}

impl GenerationRunner {
    pub fn new(
        gateway: Arc<dyn GenerationGateway>,
        messages: MessageStore,
        ledger: Arc<CreditLedger>,
        pricing: PricingCalculator,
        buffer: ChunkBuffer,
        journal_dir: PathBuf,
        config: RunnerConfig,
    ) -> Self {
        Self {
            gateway,
            messages,
            ledger,
            pricing,
            buffer,
            tools: None,
            journal_dir,
            config,
        }
    }

    /// Attach a tool runner; without one, tool calls from the model are
    /// ignored and the run finishes with whatever text was produced.
    pub fn with_tools(mut self, tools: Arc<dyn ToolRunner>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn buffer(&self) -> &ChunkBuffer {
        &self.buffer
    }

    /// Execute one run to completion.
    ///
    /// Re-executing a run id resumes from the journal: completed steps are
    /// skipped, the original message id is reused, and the ledger debit
    /// replays idempotently.
    #[instrument(skip(self, request), fields(run_id = %request.run_id))]
    pub async fn execute(&self, request: RunRequest) -> Result<RunOutcome, RunnerError> {
        let mut journal = RunJournal::open(&self.journal_dir, &request.run_id).await?;

        // Step 1: emit-start. Mint the stable message id, create the
        // assistant placeholder, and open the client-visible stream.
        self.buffer.register(&request.run_id).await;

        let message_id = match journal.state().message_id.clone() {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                journal.set_message_id(&id).await?;
                id
            }
        };

        if !journal.is_complete(StepName::EmitStart) {
            self.messages
                .create_assistant_placeholder(&request.conversation_id, &message_id)
                .await;
            self.buffer
                .append(
                    &request.run_id,
                    Chunk::Start {
                        message_id: message_id.clone(),
                    },
                )
                .await?;
            journal.record_step(StepName::EmitStart).await?;
        } else if self
            .buffer
            .replay_from(&request.run_id, 0)
            .await
            .is_some_and(|chunks| chunks.is_empty())
        {
            // Resumed after a restart; the buffer lost its history, so
            // re-open the stream for any reconnecting client.
            self.buffer
                .append(
                    &request.run_id,
                    Chunk::Start {
                        message_id: message_id.clone(),
                    },
                )
                .await?;
        }

        // Step 2: stream-generation. A failure here fails the whole run;
        // no billing step has executed yet.
        let result = if !journal.is_complete(StepName::StreamGeneration) {
            let result = match self.run_generation(&request).await {
                Ok(result) => result,
                Err(e) => {
                    self.buffer
                        .append(
                            &request.run_id,
                            Chunk::Error {
                                message: e.to_string(),
                            },
                        )
                        .await?;
                    journal.set_terminal().await?;
                    return Err(e);
                }
            };

            journal
                .set_generation(
                    result.usage,
                    result.reported_cost,
                    result.generation_id.as_deref(),
                )
                .await?;

            // Close the client stream before any bookkeeping so delivery
            // never waits on billing.
            self.buffer
                .append(
                    &request.run_id,
                    Chunk::Finish {
                        usage: Some(result.usage),
                    },
                )
                .await?;
            journal.record_step(StepName::StreamGeneration).await?;
            result
        } else {
            let state = journal.state();
            let result = GenerationResult {
                content: String::new(),
                usage: state.usage.unwrap_or_default(),
                reported_cost: state.reported_cost,
                generation_id: state.generation_id.clone(),
            };
            if self.buffer.is_terminal(&request.run_id).await == Some(false) {
                self.buffer
                    .append(
                        &request.run_id,
                        Chunk::Finish {
                            usage: Some(result.usage),
                        },
                    )
                    .await?;
            }
            result
        };

        let pricing = self.pricing.price_cost(result.reported_cost);
        if pricing.is_none() {
            warn!(
                "Run {} finished without a reported cost; skipping billing pending reconciliation",
                request.run_id
            );
        }

        // Step 3: persist-usage. Bounded retry, then swallow.
        if !journal.is_complete(StepName::PersistUsage) {
            self.persist_usage(&request, &message_id, &result, pricing.as_ref())
                .await;
            journal.record_step(StepName::PersistUsage).await?;
        }

        // Step 4: update-aggregate-usage.
        if !journal.is_complete(StepName::UpdateAggregateUsage) {
            let cost = pricing.as_ref().map(|p| p.total_microcents).unwrap_or(0);
            if let Err(e) = self
                .messages
                .add_conversation_usage(&request.conversation_id, &result.usage, cost)
                .await
            {
                warn!(
                    "Failed to update aggregate usage for {}: {}",
                    request.conversation_id, e
                );
            }
            journal.record_step(StepName::UpdateAggregateUsage).await?;
        }

        // Step 5: debit-ledger. Keyed by the provider generation id (run id
        // when absent) so a replayed run never double-bills.
        if !journal.is_complete(StepName::DebitLedger) {
            if let Some(ref pricing) = pricing {
                self.debit_ledger(&request, &result, pricing).await;
            }
            journal.record_step(StepName::DebitLedger).await?;
        }

        journal.set_terminal().await?;

        Ok(RunOutcome {
            run_id: request.run_id,
            message_id,
            usage: result.usage,
            pricing,
            generation_id: result.generation_id,
        })
    }

    /// Drive the gateway, looping when the model requests tools.
    async fn run_generation(&self, request: &RunRequest) -> Result<GenerationResult, RunnerError> {
        let mut messages = request.messages.clone();
        let mut content = String::new();
        let mut usage = UsageRecord::default();
        let mut reported_cost: Option<f64> = None;
        let mut generation_id: Option<String> = None;

        for iteration in 0..=self.config.max_tool_steps {
            // Tools are offered only on the first request; follow-up
            // requests carry the tool results and must produce text.
            let offer_tools = iteration == 0 && self.tools.is_some();
            let gateway_request = GatewayRequest {
                model: request.model.clone(),
                messages: messages.clone(),
                provider_options: request.provider_options.clone(),
                tools: if offer_tools {
                    request.tools.clone()
                } else {
                    None
                },
                stream: true,
            };

            let mut stream = self.gateway.stream_generation(gateway_request).await?;
            let mut iteration_content = String::new();
            let mut tool_calls: Vec<ToolCall> = Vec::new();

            while let Some(event) = stream.next().await {
                match event? {
                    GatewayEvent::TextDelta { text } => {
                        iteration_content.push_str(&text);
                        self.buffer
                            .append(&request.run_id, Chunk::TextDelta { text })
                            .await?;
                    }
                    GatewayEvent::ReasoningDelta { text } => {
                        self.buffer
                            .append(&request.run_id, Chunk::ReasoningDelta { text })
                            .await?;
                    }
                    GatewayEvent::ToolCall {
                        id,
                        name,
                        arguments,
                    } => {
                        self.buffer
                            .append(
                                &request.run_id,
                                Chunk::ToolCallDelta {
                                    id: id.clone(),
                                    name: name.clone(),
                                    arguments: arguments.clone(),
                                },
                            )
                            .await?;
                        tool_calls.push(ToolCall {
                            id,
                            name,
                            arguments,
                        });
                    }
                    GatewayEvent::Finish {
                        usage: finish_usage,
                        reported_cost: cost,
                        generation_id: gen_id,
                    } => {
                        if let Some(finish_usage) = finish_usage {
                            usage.add(&finish_usage.to_record());
                        }
                        if let Some(cost) = cost {
                            reported_cost = Some(reported_cost.unwrap_or(0.0) + cost);
                        }
                        if generation_id.is_none() {
                            generation_id = gen_id;
                        }
                        break;
                    }
                    GatewayEvent::Error { message } => {
                        return Err(model_gateway::GatewayError::Upstream(message).into());
                    }
                }
            }

            content.push_str(&iteration_content);

            if tool_calls.is_empty() {
                break;
            }
            let Some(ref tools) = self.tools else {
                debug!("Model requested tools but none are wired; finishing");
                break;
            };
            if iteration == self.config.max_tool_steps {
                warn!(
                    "Run {} hit the tool step limit ({})",
                    request.run_id, self.config.max_tool_steps
                );
                break;
            }

            messages.push(model_gateway::ChatMessage::assistant_with_tool_calls(
                if iteration_content.is_empty() {
                    None
                } else {
                    Some(iteration_content.clone())
                },
                tool_calls.clone(),
            ));
            for call in &tool_calls {
                debug!("Running tool {} for run {}", call.name, request.run_id);
                let output = tools.run(call).await;
                messages.push(model_gateway::ChatMessage::tool_result(
                    call.id.clone(),
                    output.content,
                ));
            }
        }

        Ok(GenerationResult {
            content,
            usage,
            reported_cost,
            generation_id,
        })
    }

    async fn persist_usage(
        &self,
        request: &RunRequest,
        message_id: &str,
        result: &GenerationResult,
        pricing: Option<&PricingResult>,
    ) {
        let content = if result.content.is_empty() {
            None
        } else {
            Some(result.content.as_str())
        };
        let cost = pricing.map(|p| p.total_microcents);

        for attempt in 1..=self.config.usage_persist_attempts {
            match self
                .messages
                .finalize_message(
                    message_id,
                    content,
                    result.usage,
                    cost,
                    result.generation_id.as_deref(),
                )
                .await
            {
                Ok(_) => return,
                Err(e) if attempt < self.config.usage_persist_attempts => {
                    debug!(
                        "Persist-usage attempt {} for run {} failed: {}",
                        attempt, request.run_id, e
                    );
                    tokio::time::sleep(self.config.usage_persist_backoff).await;
                }
                Err(e) => {
                    warn!(
                        "Giving up persisting usage for run {} after {} attempts: {}",
                        request.run_id, attempt, e
                    );
                }
            }
        }
    }

    async fn debit_ledger(
        &self,
        request: &RunRequest,
        result: &GenerationResult,
        pricing: &PricingResult,
    ) {
        if pricing.total_microcents <= 0 {
            debug!("Run {} priced at zero; nothing to debit", request.run_id);
            return;
        }

        let external = ExternalRef::new(
            "generation",
            result.generation_id.as_deref().unwrap_or(&request.run_id),
        );

        match self
            .ledger
            .debit(
                &request.account_id,
                pricing.total_microcents,
                "generation",
                Some(external),
            )
            .await
        {
            Ok(receipt) => {
                info!(
                    "Debited {} microcents from {} for run {} (balance {})",
                    pricing.total_microcents,
                    request.account_id,
                    request.run_id,
                    receipt.balance_after()
                );
                match self.ledger.reload_decision(&request.account_id).await {
                    Ok(decision) if decision.reason == ReloadReason::BelowThreshold => {
                        info!(
                            "Account {} is below its reload threshold",
                            request.account_id
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Reload check failed for {}: {}", request.account_id, e),
                }
            }
            Err(e) => {
                // The response already streamed; an unbillable run is a
                // reconciliation item, not a client error.
                warn!(
                    "Debit failed for run {} on account {}: {}",
                    request.run_id, request.account_id, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credit_ledger::{LedgerConfig, PricingCalculator};
    use model_gateway::{GatewayEventStream, GatewayUsage, ToolOutput};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    use crate::buffer::BufferConfig;

    /// Gateway that replays pre-scripted event sequences, one per call.
    struct ScriptedGateway {
        scripts: StdMutex<Vec<Vec<Result<GatewayEvent, model_gateway::GatewayError>>>>,
        calls: StdMutex<Vec<GatewayRequest>>,
    }

    impl ScriptedGateway {
        fn new(scripts: Vec<Vec<Result<GatewayEvent, model_gateway::GatewayError>>>) -> Self {
            Self {
                scripts: StdMutex::new(scripts),
                calls: StdMutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl GenerationGateway for ScriptedGateway {
        async fn stream_generation(
            &self,
            request: GatewayRequest,
        ) -> Result<GatewayEventStream, model_gateway::GatewayError> {
            self.calls.lock().unwrap().push(request);
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                return Err(model_gateway::GatewayError::Upstream(
                    "no script left".into(),
                ));
            }
            let events = scripts.remove(0);
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    struct RecordingTool {
        calls: StdMutex<Vec<ToolCall>>,
    }

    #[async_trait::async_trait]
    impl ToolRunner for RecordingTool {
        async fn run(&self, call: &ToolCall) -> ToolOutput {
            self.calls.lock().unwrap().push(call.clone());
            ToolOutput {
                content: "72F and sunny".into(),
                success: true,
            }
        }
    }

    struct Harness {
        runner: GenerationRunner,
        gateway: Arc<ScriptedGateway>,
        ledger: Arc<CreditLedger>,
        store: MessageStore,
        _dir: TempDir,
    }

    fn text(s: &str) -> Result<GatewayEvent, model_gateway::GatewayError> {
        Ok(GatewayEvent::TextDelta { text: s.into() })
    }

    fn finish(
        cost: Option<f64>,
        gen_id: Option<&str>,
    ) -> Result<GatewayEvent, model_gateway::GatewayError> {
        Ok(GatewayEvent::Finish {
            usage: Some(GatewayUsage {
                input_tokens: 100,
                output_tokens: 50,
                ..Default::default()
            }),
            reported_cost: cost,
            generation_id: gen_id.map(String::from),
        })
    }

    async fn harness(
        scripts: Vec<Vec<Result<GatewayEvent, model_gateway::GatewayError>>>,
        balance: i64,
    ) -> Harness {
        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(ScriptedGateway::new(scripts));
        let ledger = Arc::new(CreditLedger::new(LedgerConfig::default()));
        ledger.open_account("acct-1").await.unwrap();
        if balance > 0 {
            ledger
                .credit("acct-1", balance, "opening", None)
                .await
                .unwrap();
        }
        let store = MessageStore::new(100, Duration::from_secs(3600));
        let runner = GenerationRunner::new(
            gateway.clone(),
            store.clone(),
            ledger.clone(),
            PricingCalculator::default(),
            ChunkBuffer::new(BufferConfig::default()),
            dir.path().to_path_buf(),
            RunnerConfig {
                usage_persist_backoff: Duration::from_millis(1),
                ..RunnerConfig::default()
            },
        );
        Harness {
            runner,
            gateway,
            ledger,
            store,
            _dir: dir,
        }
    }

    fn request(run_id: &str) -> RunRequest {
        RunRequest::new(
            run_id,
            "conv-1",
            "acct-1",
            vec![model_gateway::ChatMessage::user("Hello")],
        )
    }

    #[tokio::test]
    async fn test_successful_run_streams_and_bills() {
        let h = harness(
            vec![vec![text("Hi"), text(" there"), finish(Some(0.02), Some("gen-1"))]],
            10_000_000,
        )
        .await;

        let outcome = h.runner.execute(request("run-1")).await.unwrap();

        assert_eq!(outcome.usage.total_tokens, 150);
        assert_eq!(outcome.pricing.unwrap().total_microcents, 2_300_000);
        assert_eq!(outcome.generation_id.as_deref(), Some("gen-1"));

        // Stream: start, two deltas, finish.
        let chunks = h.runner.buffer().replay_from("run-1", 0).await.unwrap();
        assert_eq!(chunks.len(), 4);
        assert!(matches!(&chunks[0], Chunk::Start { message_id } if *message_id == outcome.message_id));
        assert!(matches!(&chunks[3], Chunk::Finish { usage: Some(u) } if u.total_tokens == 150));

        // Message finalized with content, usage, cost, and generation id.
        let conv = h.store.get("conv-1").await.unwrap();
        let message = &conv.messages[0];
        assert_eq!(message.content, Some("Hi there".into()));
        assert_eq!(message.cost_microcents, Some(2_300_000));
        assert_eq!(message.provider_generation_id, Some("gen-1".into()));

        // Aggregates and ledger updated.
        assert_eq!(conv.usage_totals.total_tokens, 150);
        assert_eq!(conv.cost_total_microcents, 2_300_000);
        let account = h.ledger.get_account("acct-1").await.unwrap();
        assert_eq!(account.balance_microcents, 7_700_000);
    }

    #[tokio::test]
    async fn test_generation_failure_aborts_before_billing() {
        let h = harness(
            vec![vec![
                text("partial"),
                Err(model_gateway::GatewayError::Upstream("provider down".into())),
            ]],
            10_000_000,
        )
        .await;

        let result = h.runner.execute(request("run-1")).await;
        assert!(result.is_err());

        // The stream ends with an error chunk, not finish.
        let chunks = h.runner.buffer().replay_from("run-1", 0).await.unwrap();
        assert!(matches!(chunks.last(), Some(Chunk::Error { .. })));

        // No billing step ran.
        let account = h.ledger.get_account("acct-1").await.unwrap();
        assert_eq!(account.balance_microcents, 10_000_000);
        assert_eq!(h.ledger.entries("acct-1").await.unwrap().len(), 1);

        let conv = h.store.get("conv-1").await.unwrap();
        assert!(conv.messages[0].usage.is_none());
    }

    #[tokio::test]
    async fn test_upstream_error_event_fails_the_run() {
        let h = harness(
            vec![vec![
                Ok(GatewayEvent::Error {
                    message: "overloaded".into(),
                }),
            ]],
            10_000_000,
        )
        .await;

        let result = h.runner.execute(request("run-1")).await;
        assert!(matches!(
            result,
            Err(RunnerError::Gateway(model_gateway::GatewayError::Upstream(_)))
        ));
        let account = h.ledger.get_account("acct-1").await.unwrap();
        assert_eq!(account.balance_microcents, 10_000_000);
    }

    #[tokio::test]
    async fn test_missing_cost_skips_billing() {
        let h = harness(vec![vec![text("Hi"), finish(None, Some("gen-1"))]], 10_000_000).await;

        let outcome = h.runner.execute(request("run-1")).await.unwrap();
        assert!(outcome.pricing.is_none());

        // Usage still persisted; only billing is skipped.
        let conv = h.store.get("conv-1").await.unwrap();
        assert!(conv.messages[0].usage.is_some());
        assert_eq!(conv.messages[0].cost_microcents, None);

        let account = h.ledger.get_account("acct-1").await.unwrap();
        assert_eq!(account.balance_microcents, 10_000_000);
        assert_eq!(h.ledger.entries("acct-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_credits_is_swallowed() {
        let h = harness(vec![vec![text("Hi"), finish(Some(0.02), Some("gen-1"))]], 100).await;

        // The run still succeeds; the failed debit is a reconciliation item.
        let outcome = h.runner.execute(request("run-1")).await.unwrap();
        assert!(outcome.pricing.is_some());

        let account = h.ledger.get_account("acct-1").await.unwrap();
        assert_eq!(account.balance_microcents, 100);
    }

    #[tokio::test]
    async fn test_reexecution_resumes_without_double_billing() {
        let h = harness(
            vec![
                vec![text("Hi"), finish(Some(0.02), Some("gen-1"))],
                // A second script that must never run.
                vec![text("again"), finish(Some(0.02), Some("gen-2"))],
            ],
            10_000_000,
        )
        .await;

        let first = h.runner.execute(request("run-1")).await.unwrap();
        let second = h.runner.execute(request("run-1")).await.unwrap();

        // Same message id, no second gateway call, no second debit.
        assert_eq!(first.message_id, second.message_id);
        assert_eq!(h.gateway.call_count(), 1);
        let account = h.ledger.get_account("acct-1").await.unwrap();
        assert_eq!(account.balance_microcents, 7_700_000);

        let conv = h.store.get("conv-1").await.unwrap();
        assert_eq!(conv.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_after_failure_reuses_message_id() {
        let h = harness(
            vec![
                vec![Err(model_gateway::GatewayError::Upstream("flaky".into()))],
                vec![text("recovered"), finish(Some(0.01), Some("gen-1"))],
            ],
            10_000_000,
        )
        .await;

        let err = h.runner.execute(request("run-1")).await;
        assert!(err.is_err());

        let outcome = h.runner.execute(request("run-1")).await.unwrap();

        let conv = h.store.get("conv-1").await.unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].id, outcome.message_id);
        assert_eq!(conv.messages[0].content, Some("recovered".into()));
    }

    #[tokio::test]
    async fn test_tool_loop_feeds_results_back() {
        let h = harness(
            vec![
                vec![
                    Ok(GatewayEvent::ToolCall {
                        id: "call-1".into(),
                        name: "get_weather".into(),
                        arguments: r#"{"city":"Berlin"}"#.into(),
                    }),
                    finish(Some(0.01), Some("gen-1")),
                ],
                vec![text("72F and sunny in Berlin"), finish(Some(0.01), None)],
            ],
            10_000_000,
        )
        .await;

        let tool = Arc::new(RecordingTool {
            calls: StdMutex::new(Vec::new()),
        });
        let runner = harness_runner_fields(&h).with_tools(tool.clone());

        let mut req = request("run-1");
        req.tools = Some(vec![model_gateway::ToolDefinition {
            name: "get_weather".into(),
            description: "Current weather".into(),
            parameters: serde_json::json!({"type": "object"}),
        }]);

        let outcome = runner.execute(req).await.unwrap();

        // Tool ran once with the model's arguments.
        let calls = tool.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_weather");

        // Two gateway calls; the second carries the tool result and no tools.
        assert_eq!(h.gateway.call_count(), 2);
        let requests = h.gateway.calls.lock().unwrap();
        assert!(requests[0].tools.is_some());
        assert!(requests[1].tools.is_none());
        assert!(requests[1]
            .messages
            .iter()
            .any(|m| m.tool_call_id.as_deref() == Some("call-1")));

        // Usage accumulated across both iterations; costs summed.
        assert_eq!(outcome.usage.total_tokens, 300);
        assert_eq!(outcome.pricing.unwrap().total_microcents, 2_300_000);

        let chunks = runner.buffer().replay_from("run-1", 0).await.unwrap();
        assert!(chunks
            .iter()
            .any(|c| matches!(c, Chunk::ToolCallDelta { name, .. } if name == "get_weather")));
    }

    fn harness_runner_fields(h: &Harness) -> GenerationRunner {
        GenerationRunner::new(
            h.gateway.clone(),
            h.store.clone(),
            h.ledger.clone(),
            PricingCalculator::default(),
            h.runner.buffer.clone(),
            h.runner.journal_dir.clone(),
            RunnerConfig {
                usage_persist_backoff: Duration::from_millis(1),
                ..RunnerConfig::default()
            },
        )
    }
}
