// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation orchestration engine
//!
//! Drives one turn against a streaming model backend: prepare history, open
//! the stream, forward chunks while buffering them, classify the finished
//! round, then branch into the tool loop, completion, or wait-for-user. The
//! loop repeats on tool results until a terminal classification is reached
//! or the token budget hands the turn off to summarization.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;

use crate::cancel::CancelSignal;
use crate::chat::context::ConversationContext;
use crate::chat::prompt::{DefaultPromptPreparer, PromptPreparer};
use crate::chat::state::{ProcessingState, StateTracker};
use crate::config::{BudgetConfig, ConversationConfig, DefaultsConfig};
use crate::error::{ApiError, ColloquyError, Result};
use crate::history::{NoopPersistenceSink, PersistenceSink};
use crate::lifecycle::{LifecycleSignal, NoopLifecycleSignal};
use crate::llm::client::{ChatRequest, ModelClient, StreamEvent};
use crate::llm::message::{estimate_history_tokens, ChatMessage};
use crate::markup::MarkupDetector;
use crate::tokens::{CumulativeTotals, TokenAccountant, TokenUsage};
use crate::tools::{ToolCapability, ToolExecutionCoordinator, ToolInvocation, ToolResult};

const MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY: u64 = 2;
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Callback hooks for a turn.
///
/// All hooks have no-op defaults; implement the ones you need.
pub trait TurnObserver: Send + Sync {
    /// A non-fatal warning was appended to history
    fn on_warning(&self, _warning: &str) {}

    /// The turn ended with an unrecovered error
    fn on_error(&self, _error: &ColloquyError) {}

    /// The token budget threshold fired; the caller drives summarization
    fn on_token_limit_exceeded(&self, _estimated_tokens: u32, _max_tokens: u32) {}

    /// A model call was rate limited and will be retried
    fn on_rate_limited(&self, _delay_secs: u64, _attempt: u32, _max_retries: u32) {}
}

/// No-op observer for callers that don't need hooks.
#[derive(Debug, Default)]
pub struct NoopTurnObserver;

impl TurnObserver for NoopTurnObserver {}

/// One `send_message` call's inputs.
pub struct TurnRequest {
    /// The user's message text
    pub message: String,
    /// Prior conversation history
    pub history: Vec<ChatMessage>,
    /// Model identifier
    pub model: String,
    /// Maximum tokens per model response
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Token budget for the conversation window
    pub budget: BudgetConfig,
    /// Estimation settings used when the client returns no estimate
    pub conversation: ConversationConfig,
    /// Replaces the default system prompt when set
    pub system_override: Option<String>,
    /// Callback hooks
    pub observer: Arc<dyn TurnObserver>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        let defaults = DefaultsConfig::default();
        Self {
            message: message.into(),
            history: Vec::new(),
            model: defaults.model,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            budget: BudgetConfig::default(),
            conversation: ConversationConfig::default(),
            system_override: None,
            observer: Arc::new(NoopTurnObserver),
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_budget(mut self, budget: BudgetConfig) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_system_override(mut self, system: impl Into<String>) -> Self {
        self.system_override = Some(system.into());
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }
}

/// Terminal value of a turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// `Completed`, `Summarizing`, `Error`, or `Idle` after cancellation
    pub state: ProcessingState,
    /// The fatal error, when `state` is `Error`
    pub error: Option<ColloquyError>,
    /// Messages committed to history during this turn
    pub new_messages: Vec<ChatMessage>,
    /// Token totals for this turn
    pub usage: TokenUsage,
    /// The budget threshold fired and the caller should summarize
    pub summarization_requested: bool,
}

/// Caller-facing handle to an in-flight turn.
pub struct TurnHandle {
    chunks: Option<mpsc::Receiver<String>>,
    state_rx: watch::Receiver<ProcessingState>,
    tracker: Arc<StateTracker>,
    cancel: CancelSignal,
    task: tokio::task::JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    /// Take the output chunk stream. Returns `None` after the first call.
    pub fn chunk_stream(&mut self) -> Option<ReceiverStream<String>> {
        self.chunks.take().map(ReceiverStream::new)
    }

    /// Watch receiver for the processing state
    pub fn state(&self) -> watch::Receiver<ProcessingState> {
        self.state_rx.clone()
    }

    /// The current processing state
    pub fn current_state(&self) -> ProcessingState {
        self.tracker.current()
    }

    /// Cancellation signal for this turn
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Request cancellation of the turn
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Return the state to `Idle` after `Completed` or `Error`
    pub fn acknowledge(&self) {
        if matches!(
            self.tracker.current(),
            ProcessingState::Completed | ProcessingState::Error
        ) {
            self.tracker.transition(ProcessingState::Idle);
        }
    }

    /// Wait for the turn to finish and take its outcome.
    ///
    /// An untaken chunk stream is drained in the background so waiting on
    /// the outcome is not mistaken for the caller closing the channel.
    pub async fn await_outcome(mut self) -> TurnOutcome {
        if let Some(mut chunks) = self.chunks.take() {
            tokio::spawn(async move { while chunks.recv().await.is_some() {} });
        }
        match self.task.await {
            Ok(outcome) => outcome,
            Err(join_error) => TurnOutcome {
                state: ProcessingState::Error,
                error: Some(ColloquyError::Internal(format!(
                    "turn task failed: {}",
                    join_error
                ))),
                new_messages: Vec::new(),
                usage: TokenUsage::default(),
                summarization_requested: false,
            },
        }
    }
}

/// The conversation orchestration engine.
///
/// One engine serves many concurrent turns; each `send_message` call gets
/// its own [`ConversationContext`], cancel signal, and state tracker.
pub struct ConversationEngine {
    client: Arc<dyn ModelClient>,
    coordinator: ToolExecutionCoordinator,
    preparer: Arc<dyn PromptPreparer>,
    sink: Arc<dyn PersistenceSink>,
    lifecycle: Arc<dyn LifecycleSignal>,
    totals: Arc<CumulativeTotals>,
}

impl ConversationEngine {
    pub fn new(client: Arc<dyn ModelClient>, capability: Arc<dyn ToolCapability>) -> Self {
        Self {
            client,
            coordinator: ToolExecutionCoordinator::new(capability),
            preparer: Arc::new(DefaultPromptPreparer::new()),
            sink: Arc::new(NoopPersistenceSink),
            lifecycle: Arc::new(NoopLifecycleSignal),
            totals: Arc::new(CumulativeTotals::new()),
        }
    }

    pub fn with_preparer(mut self, preparer: Arc<dyn PromptPreparer>) -> Self {
        self.preparer = preparer;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn LifecycleSignal>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Process-wide (input, output) token totals across all turns
    pub fn cumulative_usage(&self) -> (u64, u64) {
        self.totals.snapshot()
    }

    /// Start a turn. Returns immediately; progress is observed through the
    /// handle's chunk stream and state receiver.
    pub fn send_message(&self, request: TurnRequest) -> TurnHandle {
        let cancel = CancelSignal::new();
        let tracker = Arc::new(StateTracker::new());
        let state_rx = tracker.subscribe();
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

        let runner = TurnRunner {
            client: self.client.clone(),
            coordinator: self.coordinator.clone(),
            preparer: self.preparer.clone(),
            sink: self.sink.clone(),
            lifecycle: self.lifecycle.clone(),
            totals: self.totals.clone(),
            tracker: tracker.clone(),
            chunk_tx,
            cancel: cancel.clone(),
            request,
        };
        let task = tokio::spawn(runner.run());

        TurnHandle {
            chunks: Some(chunk_rx),
            state_rx,
            tracker,
            cancel,
            task,
        }
    }
}

enum TurnFlow {
    /// Terminal classification reached
    Completed,
    /// Budget threshold fired; control returns to the caller
    SummarizationRequested,
}

struct TurnRunner {
    client: Arc<dyn ModelClient>,
    coordinator: ToolExecutionCoordinator,
    preparer: Arc<dyn PromptPreparer>,
    sink: Arc<dyn PersistenceSink>,
    lifecycle: Arc<dyn LifecycleSignal>,
    totals: Arc<CumulativeTotals>,
    tracker: Arc<StateTracker>,
    chunk_tx: mpsc::Sender<String>,
    cancel: CancelSignal,
    request: TurnRequest,
}

impl TurnRunner {
    async fn run(mut self) -> TurnOutcome {
        self.lifecycle.notify_busy(true);

        let mut ctx =
            ConversationContext::new(self.request.history.clone(), self.cancel.clone());
        let mut accountant = TokenAccountant::new(self.totals.clone());

        tracing::info!(
            target: "colloquy.chat.engine",
            context_id = %ctx.id,
            model = %self.request.model,
            starting_messages = ctx.history().len(),
            "turn start"
        );
        self.tracker.transition(ProcessingState::Processing);

        let flow = self.run_inner(&mut ctx, &mut accountant).await;

        ctx.finalize();
        let usage = accountant.turn_totals();
        let new_messages = ctx.new_messages().to_vec();
        let observer = self.request.observer.clone();

        let outcome = match flow {
            Ok(TurnFlow::Completed) => {
                self.tracker.transition(ProcessingState::Completed);
                TurnOutcome {
                    state: ProcessingState::Completed,
                    error: None,
                    new_messages,
                    usage,
                    summarization_requested: false,
                }
            }
            Ok(TurnFlow::SummarizationRequested) => TurnOutcome {
                state: ProcessingState::Summarizing,
                error: None,
                new_messages,
                usage,
                summarization_requested: true,
            },
            Err(error) if error.is_benign() => {
                tracing::info!(
                    target: "colloquy.chat.engine",
                    context_id = %ctx.id,
                    reason = %error,
                    "turn ended without completing"
                );
                self.tracker.transition(ProcessingState::Idle);
                TurnOutcome {
                    state: ProcessingState::Idle,
                    error: None,
                    new_messages,
                    usage,
                    summarization_requested: false,
                }
            }
            Err(error) => {
                tracing::warn!(
                    target: "colloquy.chat.engine",
                    context_id = %ctx.id,
                    error = %error,
                    "turn failed"
                );
                observer.on_error(&error);
                self.tracker.transition(ProcessingState::Error);
                TurnOutcome {
                    state: ProcessingState::Error,
                    error: Some(error),
                    new_messages,
                    usage,
                    summarization_requested: false,
                }
            }
        };

        if outcome.state != ProcessingState::Idle {
            if let Err(error) = self.sink.save_turn_stats(
                usage.total_input(),
                usage.output_tokens,
                ctx.history().len(),
            ) {
                tracing::warn!(
                    target: "colloquy.chat.engine",
                    error = %error,
                    "failed to save turn stats"
                );
            }
        }

        self.lifecycle.notify_busy(false);
        tracing::info!(
            target: "colloquy.chat.engine",
            context_id = %ctx.id,
            final_state = ?outcome.state,
            committed_messages = outcome.new_messages.len(),
            input_tokens = usage.total_input(),
            output_tokens = usage.output_tokens,
            "turn end"
        );
        outcome
    }

    async fn run_inner(
        &mut self,
        ctx: &mut ConversationContext,
        accountant: &mut TokenAccountant,
    ) -> Result<TurnFlow> {
        let detector = MarkupDetector::new();
        let user_message = ChatMessage::user(self.request.message.clone());
        let descriptors = self.coordinator.descriptors();
        let prepared = self.preparer.prepare(
            ctx.history(),
            &user_message,
            self.request.system_override.as_deref(),
            &descriptors,
        );

        let mut outgoing = prepared.messages;
        let mut round_index: usize = 0;

        loop {
            round_index += 1;
            if self.cancel.is_cancelled() {
                return Err(ColloquyError::Cancelled);
            }

            tracing::debug!(
                target: "colloquy.chat.engine",
                context_id = %ctx.id,
                round = round_index,
                outgoing_messages = outgoing.len(),
                "starting model round"
            );

            let chat_request =
                ChatRequest::new(self.request.model.clone(), outgoing.clone())
                    .with_system(prepared.system.clone())
                    .with_max_tokens(self.request.max_tokens)
                    .with_temperature(self.request.temperature);

            self.tracker.transition(ProcessingState::Connecting);
            let stream = self.open_stream_with_retry(chat_request).await?;

            ctx.start_new_round();
            self.pump_stream(ctx, accountant, stream).await?;

            let classification = detector.classify(ctx.round_raw());
            tracing::debug!(
                target: "colloquy.chat.engine",
                context_id = %ctx.id,
                round = round_index,
                invocations = classification.invocations.len(),
                completion = classification.has_completion_marker,
                wait = classification.has_wait_marker,
                round_preview = %crate::utils::truncate_for_log(ctx.round_raw(), 80),
                "round classified"
            );

            if round_index == 1 {
                // The user message commits only after its response stream
                // finished without error.
                self.commit(ctx, &mut outgoing, user_message.clone());
            }
            self.commit(
                ctx,
                &mut outgoing,
                ChatMessage::assistant(ctx.round_raw().to_string()),
            );

            if classification.has_completion_marker {
                if !classification.invocations.is_empty() {
                    let warning = skipped_tools_warning(&classification.invocations);
                    self.emit_warning(ctx, &mut outgoing, &warning).await;
                }
                return Ok(TurnFlow::Completed);
            }

            if classification.invocations.is_empty() {
                // Wait marker, or no markers at all: pause for the user.
                return Ok(TurnFlow::Completed);
            }

            if classification.has_wait_marker {
                let warning = unsafe_wait_warning(&classification.invocations);
                self.emit_warning(ctx, &mut outgoing, &warning).await;
            }

            tracing::info!(
                target: "colloquy.chat.engine",
                context_id = %ctx.id,
                round = round_index,
                tool_calls = classification.invocations.len(),
                "entering tool execution phase"
            );
            self.tracker.transition(ProcessingState::ExecutingTool);
            let results = self
                .coordinator
                .execute_batch(classification.invocations, &self.cancel)
                .await?;
            self.tracker.transition(ProcessingState::ProcessingToolResult);

            for result in &results {
                self.commit(ctx, &mut outgoing, ChatMessage::tool(render_tool_result(result)));
            }

            let estimate = match self.client.estimate_tokens(&outgoing) {
                0 => estimate_history_tokens(&outgoing, &self.request.conversation),
                estimate => estimate,
            };
            if accountant.should_trigger_summary(
                self.request.budget.max_tokens,
                self.request.budget.summary_ratio,
                estimate,
            ) {
                tracing::info!(
                    target: "colloquy.chat.engine",
                    context_id = %ctx.id,
                    estimated_tokens = estimate,
                    max_tokens = self.request.budget.max_tokens,
                    "token budget threshold reached; handing off to summarization"
                );
                ctx.finalize();
                self.request
                    .observer
                    .on_token_limit_exceeded(estimate, self.request.budget.max_tokens);
                self.tracker.transition(ProcessingState::Summarizing);
                return Ok(TurnFlow::SummarizationRequested);
            }
        }
    }

    /// Forward stream events into the context, the chunk channel, and the
    /// accountant until the stream ends.
    async fn pump_stream(
        &self,
        ctx: &mut ConversationContext,
        accountant: &mut TokenAccountant,
        mut stream: crate::llm::client::ModelStream,
    ) -> Result<()> {
        let mut first_chunk = true;
        loop {
            let event = tokio::select! {
                event = stream.next() => event,
                _ = self.cancel.cancelled() => return Err(ColloquyError::Cancelled),
            };
            let Some(event) = event else {
                return Ok(());
            };
            match event? {
                StreamEvent::TextDelta(text) => {
                    if first_chunk {
                        self.tracker.transition(ProcessingState::Receiving);
                        first_chunk = false;
                    }
                    ctx.buffer_chunk(&text);
                    if self.chunk_tx.send(text).await.is_err() {
                        return Err(ColloquyError::ChannelClosed);
                    }
                }
                StreamEvent::Usage(report) => accountant.record_usage(&report),
                StreamEvent::StreamEnd => return Ok(()),
            }
        }
    }

    /// Open the model stream, retrying bounded times on rate limits.
    async fn open_stream_with_retry(
        &self,
        request: ChatRequest,
    ) -> Result<crate::llm::client::ModelStream> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(
                target: "colloquy.chat.engine",
                model = %request.model,
                attempt,
                message_count = request.messages.len(),
                "requesting model stream"
            );
            match self.client.send_message(request.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(ColloquyError::Api(ApiError::RateLimited(retry_after))) => {
                    if attempt > MAX_RETRIES {
                        return Err(ColloquyError::Api(ApiError::RateLimited(retry_after)));
                    }
                    let delay_secs = if retry_after > 0 {
                        retry_after as u64
                    } else {
                        BASE_RETRY_DELAY.pow(attempt)
                    };
                    tracing::warn!(
                        target: "colloquy.chat.engine",
                        model = %request.model,
                        attempt,
                        max_retries = MAX_RETRIES,
                        retry_after_secs = delay_secs,
                        "rate limited; retrying request"
                    );
                    self.request
                        .observer
                        .on_rate_limited(delay_secs, attempt, MAX_RETRIES);
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(delay_secs)) => {}
                        _ = self.cancel.cancelled() => return Err(ColloquyError::Cancelled),
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Append a message to the working history and the persistence sink.
    fn commit(
        &self,
        ctx: &mut ConversationContext,
        outgoing: &mut Vec<ChatMessage>,
        message: ChatMessage,
    ) {
        if let Err(error) = self.sink.append_message(&message) {
            tracing::warn!(
                target: "colloquy.chat.engine",
                error = %error,
                "failed to persist message"
            );
        }
        outgoing.push(message.clone());
        ctx.push_message(message);
    }

    /// Commit a warning as a system-role history entry and surface it to the
    /// caller through the chunk stream and the observer.
    async fn emit_warning(
        &self,
        ctx: &mut ConversationContext,
        outgoing: &mut Vec<ChatMessage>,
        warning: &str,
    ) {
        tracing::warn!(
            target: "colloquy.chat.engine",
            context_id = %ctx.id,
            warning,
            "round produced an unsafe marker combination"
        );
        self.commit(ctx, outgoing, ChatMessage::system(warning.to_string()));
        self.request.observer.on_warning(warning);
        // A caller that already left shouldn't fail the warning path.
        let _ = self.chunk_tx.send(format!("\n{}\n", warning)).await;
    }
}

fn tool_names(invocations: &[ToolInvocation]) -> String {
    invocations
        .iter()
        .map(|i| i.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn skipped_tools_warning(invocations: &[ToolInvocation]) -> String {
    format!(
        "Completion marker present; skipped tool invocation(s): {}",
        tool_names(invocations)
    )
}

fn unsafe_wait_warning(invocations: &[ToolInvocation]) -> String {
    format!(
        "Wait marker combined with tool invocation(s): {}; executing tools anyway",
        tool_names(invocations)
    )
}

fn render_tool_result(result: &ToolResult) -> String {
    if result.is_error() {
        format!("[{}] error: {}", result.tool_name, result.payload)
    } else {
        format!("[{}] {}", result.tool_name, result.payload)
    }
}
