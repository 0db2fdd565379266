//! Stream Ingestor Implementation
//!
//! Drives one provider response stream into the conversation store.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::backend::{StreamChunk, StreamingToken};
use crate::citations::CitationRegistry;
use crate::conversation::{ConversationStore, InvalidStateError};
use crate::messages::{AssistantMessage, Citation, ExchangeState, Message};
use crate::storage::Storage;

// ============================================================================
// Stream State
// ============================================================================

/// Transient state of one outstanding exchange
///
/// Created on submit and discarded when the exchange reaches a terminal
/// state. Never persisted.
#[derive(Clone, Debug)]
pub struct StreamState {
    /// Still waiting for the first chunk
    pub pending: bool,
    /// Text received so far
    pub accumulated_text: String,
    /// Citations seen during this turn
    pub citations: CitationRegistry,
    /// Log index of the bot turn, once it exists
    pub bot_index: Option<usize>,
    /// Chunks applied so far
    pub chunks: u32,
    /// When the request was sent
    pub started_at: Instant,
}

impl StreamState {
    fn pending() -> Self {
        Self {
            pending: true,
            accumulated_text: String::new(),
            citations: CitationRegistry::new(),
            bot_index: None,
            chunks: 0,
            started_at: Instant::now(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

// ============================================================================
// Ingestor
// ============================================================================

/// Exchange state machine
///
/// ```text
/// Idle --begin--> Sending --chunk--> Streaming --chunk--> Streaming
///                    |                   |
///                    |                   +--end--> Finalized
///                    +--end (no chunk)---------->  Finalized
///                    +--error--> Failed (apology turn appended)
///                                Streaming --error--> Failed (partial kept)
/// ```
///
/// All store mutations go through [`ConversationStore`]; the ingestor only
/// decides what to append and when. Every method returns the notifications
/// the surface should see, in order.
pub struct StreamIngestor {
    state: ExchangeState,
    receiver: Option<mpsc::Receiver<StreamingToken>>,
    stream: Option<StreamState>,
    apology_text: String,
}

impl StreamIngestor {
    /// Create an idle ingestor
    pub fn new(apology_text: impl Into<String>) -> Self {
        Self {
            state: ExchangeState::Idle,
            receiver: None,
            stream: None,
            apology_text: apology_text.into(),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Whether an exchange is outstanding
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.state.is_in_flight()
    }

    /// Whether a response stream is attached
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.receiver.is_some()
    }

    /// The in-flight exchange, if any
    #[must_use]
    pub fn stream_state(&self) -> Option<&StreamState> {
        self.stream.as_ref()
    }

    /// Text shown for a rejected request
    #[must_use]
    pub fn apology_text(&self) -> &str {
        &self.apology_text
    }

    /// Enter `Sending` after the user turn was stored
    ///
    /// Returns no notifications when an exchange is already in flight.
    pub fn begin(&mut self) -> Vec<AssistantMessage> {
        if self.is_in_flight() {
            tracing::warn!(state = ?self.state, "Exchange already in flight, ignoring begin");
            return Vec::new();
        }
        self.stream = Some(StreamState::pending());
        self.receiver = None;
        vec![self.transition(ExchangeState::Sending)]
    }

    /// Hand over the provider's response stream
    pub fn attach(&mut self, receiver: mpsc::Receiver<StreamingToken>) {
        if self.state == ExchangeState::Sending {
            self.receiver = Some(receiver);
        } else {
            tracing::warn!(state = ?self.state, "Dropping stream attached outside Sending");
        }
    }

    /// The provider rejected the request before streaming
    pub fn reject<S: Storage>(
        &mut self,
        store: &mut ConversationStore<S>,
        reason: &str,
    ) -> Vec<AssistantMessage> {
        let mut events = Vec::new();
        self.fail(store, reason, &mut events);
        events
    }

    /// Apply every token already buffered (non-blocking)
    ///
    /// Stops at the first terminal transition.
    pub fn poll<S: Storage>(&mut self, store: &mut ConversationStore<S>) -> Vec<AssistantMessage> {
        let mut events = Vec::new();

        while self.is_in_flight() {
            let Some(receiver) = self.receiver.as_mut() else {
                break;
            };
            match receiver.try_recv() {
                Ok(token) => self.apply(store, token, &mut events),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.finalize(store, &mut events);
                }
            }
        }

        events
    }

    /// Wait for the next token and apply it
    ///
    /// Returns an empty list when nothing is in flight or no stream is
    /// attached yet.
    pub async fn next<S: Storage>(
        &mut self,
        store: &mut ConversationStore<S>,
    ) -> Vec<AssistantMessage> {
        let mut events = Vec::new();
        if !self.is_in_flight() {
            return events;
        }
        let Some(receiver) = self.receiver.as_mut() else {
            return events;
        };

        match receiver.recv().await {
            Some(token) => self.apply(store, token, &mut events),
            None => self.finalize(store, &mut events),
        }
        events
    }

    /// Return to `Idle` from a terminal state
    pub fn reset(&mut self) {
        if !self.is_in_flight() {
            self.state = ExchangeState::Idle;
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    fn apply<S: Storage>(
        &mut self,
        store: &mut ConversationStore<S>,
        token: StreamingToken,
        events: &mut Vec<AssistantMessage>,
    ) {
        match token {
            StreamingToken::Chunk(chunk) => self.apply_chunk(store, chunk, events),
            StreamingToken::Error(reason) => self.fail(store, &reason, events),
        }
    }

    fn apply_chunk<S: Storage>(
        &mut self,
        store: &mut ConversationStore<S>,
        chunk: StreamChunk,
        events: &mut Vec<AssistantMessage>,
    ) {
        if self.state == ExchangeState::Sending {
            let message = Message::bot("");
            let index = store.append_in_flight(message.clone());
            // New turn, new citation scope
            let stream = self.stream.get_or_insert_with(StreamState::pending);
            stream.pending = false;
            stream.bot_index = Some(index);
            stream.citations.reset();

            events.push(self.transition(ExchangeState::Streaming));
            events.push(AssistantMessage::TurnAppended { index, message });
        }

        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let Some(index) = stream.bot_index else {
            return;
        };
        stream.chunks += 1;

        if let Some(citations) = chunk.citations {
            let added = stream.citations.record_all(citations);
            if added > 0 {
                tracing::debug!(added, total = stream.citations.len(), "New citations");
            }
        }

        let Some(text) = chunk.text.filter(|t| !t.is_empty()) else {
            return;
        };
        stream.accumulated_text.push_str(&text);

        match store.update_last(|m| m.append(&text)) {
            Ok(message) => {
                tracing::debug!(index, bytes = text.len(), "Chunk applied");
                events.push(AssistantMessage::TurnUpdated {
                    index,
                    text: message.text.clone(),
                });
            }
            Err(e) => contract_violation(&e),
        }
    }

    fn finalize<S: Storage>(
        &mut self,
        store: &mut ConversationStore<S>,
        events: &mut Vec<AssistantMessage>,
    ) {
        self.receiver = None;
        let stream = self.stream.take();

        match stream.and_then(|s| s.bot_index.map(|index| (s, index))) {
            Some((mut stream, index)) => {
                let citations = seal_turn(store, &mut stream);

                tracing::info!(
                    index,
                    chunks = stream.chunks,
                    citations = citations.as_ref().map_or(0, Vec::len),
                    elapsed_ms = stream.elapsed().as_millis() as u64,
                    "Response finalized"
                );
                events.push(AssistantMessage::TurnFinalized { index, citations });
            }
            None => {
                tracing::info!("Response ended without content");
            }
        }

        events.push(self.transition(ExchangeState::Finalized));
    }

    fn fail<S: Storage>(
        &mut self,
        store: &mut ConversationStore<S>,
        reason: &str,
        events: &mut Vec<AssistantMessage>,
    ) {
        self.receiver = None;
        let stream = self.stream.take();

        match stream.and_then(|s| s.bot_index.map(|index| (s, index))) {
            Some((mut stream, index)) => {
                // Partial answer stays as received, with the sources seen so far
                let citations = seal_turn(store, &mut stream);
                tracing::warn!(
                    index,
                    reason,
                    citations = citations.as_ref().map_or(0, Vec::len),
                    "Response stream broke mid-answer"
                );
                events.push(AssistantMessage::TurnFinalized { index, citations });
            }
            None => {
                tracing::warn!(reason, "Provider rejected the request");
                let message = Message::bot(self.apology_text.clone());
                let index = store.append(message.clone());
                events.push(AssistantMessage::TurnAppended { index, message });
            }
        }

        events.push(self.transition(ExchangeState::Failed));
    }

    fn transition(&mut self, state: ExchangeState) -> AssistantMessage {
        tracing::debug!(from = ?self.state, to = ?state, "Exchange state");
        self.state = state;
        AssistantMessage::State { state }
    }
}

/// Write the turn's citations once and seal it
fn seal_turn<S: Storage>(
    store: &mut ConversationStore<S>,
    stream: &mut StreamState,
) -> Option<Vec<Citation>> {
    let citations = stream.citations.take();
    if let Some(ref found) = citations {
        let found = found.clone();
        if let Err(e) = store.update_last(move |m| m.citations = Some(found)) {
            contract_violation(&e);
        }
    }
    store.finish_last();
    citations
}

/// An internal ordering bug; logged, never surfaced to the caller
fn contract_violation(error: &InvalidStateError) {
    tracing::error!(error = %error, "Conversation store rejected an update");
}

// ============================================================================
// Tests
// ============================================================================
