//! Completion cycle orchestration.
//!
//! A [`SessionController`] runs one request/response cycle at a time:
//!
//! - `Idle` → `Sending`: snapshot the conversation, build the request, append
//!   the user message and an empty assistant message, arm the timeout.
//! - `Sending` → `Streaming`: the request went out; frames are classified and
//!   applied to the conversation store as they arrive.
//! - `Streaming` → `Completed | TimedOut | Errored | Closed | Cancelled`:
//!   whichever exit path fires first runs cleanup, later ones are no-ops.

use crate::classifier::{self, Action};
use crate::splitter::split_content;
use crate::store::{
    AppStateStore, ConversationState, ConversationStore, DocumentPatch, MessagePatch,
};
use crate::transport::{CloseInfo, Transport};
use crate::{CanvasError, Result};
use canvas_types::{
    Artifact, ArtifactLength, ArtifactRef, Author, ChatCompletionRequest, ChatMessage,
    ChatMessageEvent, HistoryTurn, KnowledgeSource, ResponseEnvelope, UsageInfo,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/api/canvas/completion";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const ARTIFACT_MARKER_START: &str = "|artifact|>";
pub const ARTIFACT_MARKER_END: &str = "<|artifact|";

/// Configuration for the session controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// WebSocket completion endpoint
    pub endpoint: String,
    /// Cycle timeout; `None` disables it
    pub request_timeout: Option<Duration>,
    pub artifact_marker_start: String,
    pub artifact_marker_end: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            artifact_marker_start: ARTIFACT_MARKER_START.to_string(),
            artifact_marker_end: ARTIFACT_MARKER_END.to_string(),
        }
    }
}

/// Generation controls copied into every request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub knowledge: Vec<KnowledgeSource>,
    pub model_id: Option<String>,
    pub embed_model_id: Option<String>,
    pub workflow_id: Option<String>,
    pub artifact_length: Option<ArtifactLength>,
    pub add_comments: Option<bool>,
    pub add_logs: Option<bool>,
    pub fix_bugs: Option<bool>,
    pub web_search_enabled: Option<bool>,
    pub stream: Option<bool>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub similarity_cutoff: Option<f32>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            knowledge: vec![KnowledgeSource::vector_store("design_library", "qdrant")],
            model_id: None,
            embed_model_id: None,
            workflow_id: None,
            artifact_length: None,
            add_comments: None,
            add_logs: None,
            fix_bugs: None,
            web_search_enabled: Some(false),
            stream: None,
            temperature: None,
            max_tokens: None,
            similarity_cutoff: None,
        }
    }
}

/// Controller phase, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Sending,
    Streaming,
    Completed,
    TimedOut,
    Errored,
    Closed,
    Cancelled,
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Usage received and the connection closed
    Completed,
    TimedOut,
    Errored,
    /// The service closed the connection without a usage signal
    Closed,
    Cancelled,
}

impl From<CycleOutcome> for CyclePhase {
    fn from(outcome: CycleOutcome) -> Self {
        match outcome {
            CycleOutcome::Completed => CyclePhase::Completed,
            CycleOutcome::TimedOut => CyclePhase::TimedOut,
            CycleOutcome::Errored => CyclePhase::Errored,
            CycleOutcome::Closed => CyclePhase::Closed,
            CycleOutcome::Cancelled => CyclePhase::Cancelled,
        }
    }
}

/// Result of feeding one frame to a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Usage received; the transport should be closed
    Terminate,
    /// The cycle had already ended
    Ignored,
}

/// State shared by the controller and all of its cycles.
struct Shared {
    active: Mutex<Option<u64>>,
    next_id: AtomicU64,
    /// Artifact id named by the latest `event`; used for inline placeholders
    stream_target: Mutex<Option<String>>,
    phase: watch::Sender<CyclePhase>,
    responses: broadcast::Sender<ResponseEnvelope>,
}

impl Shared {
    fn acquire(&self) -> Result<u64> {
        let mut active = lock(&self.active);
        if let Some(id) = *active {
            warn!(target: "canvas::cycle", "Rejecting new request while cycle {} is active", id);
            return Err(CanvasError::CycleInProgress);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        *active = Some(id);
        Ok(id)
    }

    fn release(&self, id: u64) {
        let mut active = lock(&self.active);
        if *active == Some(id) {
            *active = None;
        }
    }
}

/// Orchestrates completion cycles against the conversation and app state stores.
pub struct SessionController {
    config: ControllerConfig,
    options: Mutex<RequestOptions>,
    conversation: Arc<ConversationStore>,
    app_state: Arc<AppStateStore>,
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(
        config: ControllerConfig,
        conversation: Arc<ConversationStore>,
        app_state: Arc<AppStateStore>,
    ) -> Self {
        let (phase, _) = watch::channel(CyclePhase::Idle);
        let (responses, _) = broadcast::channel(256);

        Self {
            config,
            options: Mutex::new(RequestOptions::default()),
            conversation,
            app_state,
            shared: Arc::new(Shared {
                active: Mutex::new(None),
                next_id: AtomicU64::new(0),
                stream_target: Mutex::new(None),
                phase,
                responses,
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn request_options(&self) -> RequestOptions {
        lock(&self.options).clone()
    }

    pub fn set_request_options(&self, options: RequestOptions) {
        *lock(&self.options) = options;
    }

    pub fn phase(&self) -> CyclePhase {
        *self.shared.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<CyclePhase> {
        self.shared.phase.subscribe()
    }

    /// Subscribe to every decoded response envelope, including the ones that
    /// cause no state transition (sources, errors, confirmations).
    pub fn subscribe(&self) -> broadcast::Receiver<ResponseEnvelope> {
        self.shared.responses.subscribe()
    }

    /// Build the request the next `send_message` would send.
    pub fn build_request(&self) -> ChatCompletionRequest {
        self.request_from(&self.conversation.snapshot())
    }

    /// Start a cycle for the current input.
    ///
    /// Returns once the request has been sent; streaming continues in the
    /// background and is observed through the stores or the returned [`Cycle`].
    /// On failure the cycle has already been cleaned up.
    pub async fn send_message(&self) -> Result<Cycle> {
        let ctx = self.new_cycle()?;
        let snapshot = self.conversation.snapshot();
        let request = self.request_from(&snapshot);
        let transport = Transport::new();

        info!(
            target: "canvas::cycle",
            "Starting cycle {} ({} history turns, artifact: {})",
            ctx.id,
            request.chat_history.len(),
            request.artifact.is_some()
        );

        self.shared.phase.send_replace(CyclePhase::Sending);
        self.app_state.set_generation_active(true);
        ctx.arm_timeout(&transport, self.config.request_timeout);
        self.init_chat_message(&snapshot);

        let on_message = Arc::clone(&ctx);
        let on_error = Arc::clone(&ctx);
        let on_close = Arc::clone(&ctx);
        transport
            .on_message(move |raw, transport| {
                if on_message.process_response(raw) == Flow::Terminate {
                    transport.disconnect();
                }
            })
            .on_error(move |error, transport| {
                warn!(target: "canvas::cycle", "Cycle {} transport error: {}", on_error.id, error);
                transport.disconnect();
                on_error.cleanup(CycleOutcome::Errored);
            })
            .on_close(move |info, _| on_close.finish_on_close(info));

        match transport.send(&request, &self.config.endpoint).await {
            Ok(()) => {
                if !ctx.mark_streaming() {
                    transport.disconnect();
                }
                Ok(Cycle {
                    outcome: ctx.outcome.subscribe(),
                    ctx,
                    transport,
                })
            }
            Err(e) => {
                transport.disconnect();
                if ctx.outcome() == Some(CycleOutcome::TimedOut) {
                    if let Some(duration) = self.config.request_timeout {
                        return Err(CanvasError::Timeout(duration));
                    }
                }
                warn!(target: "canvas::cycle", "Cycle {} failed to send: {}", ctx.id, e);
                ctx.cleanup(CycleOutcome::Errored);
                Err(e)
            }
        }
    }

    fn new_cycle(&self) -> Result<Arc<CycleContext>> {
        let id = self.shared.acquire()?;
        let (outcome, _) = watch::channel(None);

        Ok(Arc::new(CycleContext {
            id,
            marker_start: self.config.artifact_marker_start.clone(),
            marker_end: self.config.artifact_marker_end.clone(),
            conversation: Arc::clone(&self.conversation),
            app_state: Arc::clone(&self.app_state),
            shared: Arc::clone(&self.shared),
            state: Mutex::new(CycleState::default()),
            outcome,
        }))
    }

    fn request_from(&self, snapshot: &ConversationState) -> ChatCompletionRequest {
        let options = self.request_options();
        let document = &snapshot.current_document;
        let artifact = (!document.is_empty()).then(|| ArtifactRef {
            id: document.id.clone(),
            content: document.content.clone(),
        });

        ChatCompletionRequest {
            message: snapshot.input.value.clone(),
            chat_history: snapshot
                .messages()
                .filter(|m| !m.message.is_empty())
                .map(|m| HistoryTurn {
                    role: m.role,
                    content: m.message.clone(),
                })
                .collect(),
            knowledge: options.knowledge,
            model_id: options.model_id,
            embed_model_id: options.embed_model_id,
            workflow_id: options.workflow_id,
            highlighted_text: snapshot.input.highlighted.clone(),
            artifact,
            artifact_length: options.artifact_length,
            add_comments: options.add_comments,
            add_logs: options.add_logs,
            fix_bugs: options.fix_bugs,
            web_search_enabled: options.web_search_enabled,
            stream: options.stream,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            similarity_cutoff: options.similarity_cutoff,
        }
    }

    fn init_chat_message(&self, snapshot: &ConversationState) {
        self.conversation.append_message(ChatMessage::user(
            snapshot.input.value.clone(),
            snapshot.input.context.clone(),
        ));
        self.conversation.append_message(ChatMessage::assistant());
        self.conversation.set_input_value("");
    }
}

/// Handle to a running cycle.
pub struct Cycle {
    ctx: Arc<CycleContext>,
    transport: Transport,
    outcome: watch::Receiver<Option<CycleOutcome>>,
}

impl Cycle {
    pub fn id(&self) -> u64 {
        self.ctx.id
    }

    /// Outcome, once the cycle has ended.
    pub fn outcome(&self) -> Option<CycleOutcome> {
        *self.outcome.borrow()
    }

    /// Wait for the cycle to end.
    pub async fn finished(&mut self) -> CycleOutcome {
        match self.outcome.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(CycleOutcome::Closed),
            Err(_) => CycleOutcome::Closed,
        }
    }

    /// Usage reported by the service, once received.
    pub fn usage(&self) -> Option<UsageInfo> {
        self.ctx.lock().usage.clone()
    }

    /// Text of the latest `error` frame, if the service sent one.
    pub fn service_error(&self) -> Option<String> {
        self.ctx.lock().service_error.clone()
    }

    /// Stop the cycle. Returns false if it had already ended.
    pub fn cancel(&self) -> bool {
        info!(target: "canvas::cycle", "Cancelling cycle {}", self.ctx.id);
        self.transport.disconnect();
        self.ctx.cleanup(CycleOutcome::Cancelled)
    }
}

#[derive(Default)]
struct CycleState {
    /// Raw chunks received so far
    buffer: Vec<String>,
    finished: bool,
    usage_seen: bool,
    usage: Option<UsageInfo>,
    service_error: Option<String>,
    timeout: Option<JoinHandle<()>>,
}

/// Per-cycle state captured by the transport handlers and the timer.
struct CycleContext {
    id: u64,
    marker_start: String,
    marker_end: String,
    conversation: Arc<ConversationStore>,
    app_state: Arc<AppStateStore>,
    shared: Arc<Shared>,
    state: Mutex<CycleState>,
    outcome: watch::Sender<Option<CycleOutcome>>,
}

impl CycleContext {
    fn lock(&self) -> MutexGuard<'_, CycleState> {
        lock(&self.state)
    }

    fn outcome(&self) -> Option<CycleOutcome> {
        *self.outcome.borrow()
    }

    fn arm_timeout(self: &Arc<Self>, transport: &Transport, timeout: Option<Duration>) {
        let Some(duration) = timeout else {
            return;
        };

        let ctx = Arc::clone(self);
        let transport = transport.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            transport.disconnect();
            warn!(target: "canvas::cycle", "Cycle {}: {}", ctx.id, CanvasError::Timeout(duration));
            ctx.cleanup(CycleOutcome::TimedOut);
        });
        self.lock().timeout = Some(timer);
    }

    /// Enter `Streaming` unless the cycle already ended.
    fn mark_streaming(&self) -> bool {
        let state = self.lock();
        if state.finished {
            return false;
        }
        self.shared.phase.send_replace(CyclePhase::Streaming);
        true
    }

    fn process_response(&self, raw: &str) -> Flow {
        let mut state = self.lock();
        if state.finished || state.usage_seen {
            trace!(target: "canvas::cycle", "Cycle {} ignoring frame after end", self.id);
            return Flow::Ignored;
        }

        let envelope = match classifier::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(target: "canvas::classifier", "Dropping frame: {}", e);
                return Flow::Continue;
            }
        };
        trace!(target: "canvas::classifier", "Received {}", envelope.kind());

        if let ResponseEnvelope::Error(body) = &envelope {
            let message = body
                .error_message()
                .unwrap_or_else(|| "unknown error".to_string());
            warn!(target: "canvas::cycle", "Cycle {} service error: {}", self.id, message);
            state.service_error = Some(message);
        }

        let action = classifier::classify(&envelope);
        // No subscribers is fine.
        let _ = self.shared.responses.send(envelope);

        match action {
            Action::Progress {
                description,
                artifact_id,
            } => {
                self.handle_event(description, artifact_id);
                Flow::Continue
            }
            Action::Chunk(text) => {
                self.handle_chunk(&mut state, text);
                Flow::Continue
            }
            Action::Terminate(usage) => {
                if let Some(usage) = &usage {
                    info!(
                        target: "canvas::cycle",
                        "Cycle {} generated {} tokens (trace: {})",
                        self.id,
                        usage.generated_tokens,
                        usage.trace_id.as_deref().unwrap_or("-")
                    );
                }
                state.usage_seen = true;
                state.usage = usage;
                Flow::Terminate
            }
            Action::Passthrough => Flow::Continue,
        }
    }

    fn handle_event(&self, description: Option<String>, artifact_id: Option<String>) {
        let snapshot = self.conversation.snapshot();
        let Some(last) = snapshot.last_message.as_ref() else {
            return;
        };

        if let Some(id) = artifact_id {
            *lock(&self.shared.stream_target) = Some(id.clone());
            if snapshot.current_document.id != id {
                info!(target: "canvas::cycle", "Cycle {} streaming into document {}", self.id, id);
                self.conversation
                    .set_current_document(Artifact::empty(Some(id), Author::Assistant));
            }
        }

        if let Some(label) = description {
            debug!(target: "canvas::cycle", "Progress: {}", label);
            let mut events = last.events.clone();
            events.push(ChatMessageEvent::progress(label));
            self.conversation.replace_last_message(MessagePatch::events(events));
        }
    }

    fn handle_chunk(&self, state: &mut CycleState, text: String) {
        if self.conversation.snapshot().last_message.is_none() {
            return;
        }

        state.buffer.push(text);
        let accumulated = state.buffer.concat();
        let (before, inside, after) = split_content(
            &accumulated,
            Some(&self.marker_start),
            Some(&self.marker_end),
        );

        let mut composed = before;
        if !inside.is_empty() {
            composed.push_str(&format!("[artifact id=\"{}\"]", self.placeholder_id()));
        }
        composed.push_str(&after);
        self.conversation.replace_last_message(MessagePatch::message(composed));
        self.conversation.merge_current_document(DocumentPatch::content(inside));
    }

    fn placeholder_id(&self) -> String {
        lock(&self.shared.stream_target)
            .clone()
            .unwrap_or_else(|| self.conversation.snapshot().current_document.id.clone())
    }

    fn finish_on_close(&self, info: &CloseInfo) {
        debug!(
            target: "canvas::cycle",
            "Cycle {} connection closed (code: {:?}, clean: {})",
            self.id,
            info.code,
            info.clean
        );
        let outcome = if self.lock().usage_seen {
            CycleOutcome::Completed
        } else {
            CycleOutcome::Closed
        };
        self.cleanup(outcome);
    }

    /// End the cycle. Only the first call has any effect.
    fn cleanup(&self, outcome: CycleOutcome) -> bool {
        let mut state = self.lock();
        if state.finished {
            return false;
        }
        state.finished = true;
        state.buffer.clear();
        if let Some(timer) = state.timeout.take() {
            timer.abort();
        }
        drop(state);

        self.app_state.set_generation_active(false);
        self.shared.phase.send_replace(outcome.into());
        self.outcome.send_replace(Some(outcome));
        // Released last so a new cycle cannot observe this one's terminal phase.
        self.shared.release(self.id);

        info!(target: "canvas::cycle", "Cycle {} ended: {:?}", self.id, outcome);
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
