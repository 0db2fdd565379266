//! Assistant - The Message-Exchange Core
//!
//! The Assistant wires the pieces of one conversation together:
//! - [`InputController`]: what the user is authoring
//! - [`ConversationStore`]: the durable log
//! - [`StreamIngestor`]: the exchange state machine
//! - a [`CompletionProvider`]: the hosted model
//!
//! # Design Philosophy
//!
//! The Assistant is UI-agnostic. A surface (terminal, web view, test harness)
//! forwards [`SurfaceEvent`]s in and renders [`AssistantMessage`]s out. At
//! most one exchange is in flight; submission is refused by the state machine
//! itself rather than by a disabled button.
//!
//! A surface that goes away does not cancel anything. Notifications that
//! cannot be delivered are dropped, and the exchange still runs to completion
//! so the stored log stays consistent.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::{CompletionProvider, CompletionRequest};
use crate::config::AssistantConfig;
use crate::conversation::{ConversationLog, ConversationStore};
use crate::events::SurfaceEvent;
use crate::input::InputController;
use crate::markup::Style;
use crate::messages::{AssistantMessage, ExchangeState, Message};
use crate::storage::Storage;
use crate::streaming::StreamIngestor;

/// Headless conversation engine
pub struct Assistant<P: CompletionProvider, S: Storage> {
    /// Hosted model
    provider: Arc<P>,
    /// Durable log
    store: ConversationStore<S>,
    /// Authored text and selection
    input: InputController,
    /// Exchange state machine
    ingestor: StreamIngestor,
    /// Effective configuration
    config: AssistantConfig,
    /// Channel to the surface
    tx: mpsc::Sender<AssistantMessage>,
    /// Set once the surface stopped listening
    surface_gone: bool,
}

impl<P: CompletionProvider, S: Storage> Assistant<P, S> {
    /// Create an assistant and restore the persisted conversation
    pub fn new(
        provider: Arc<P>,
        storage: Arc<S>,
        config: AssistantConfig,
        tx: mpsc::Sender<AssistantMessage>,
    ) -> Self {
        let store = ConversationStore::open(
            storage,
            config.storage_key.clone(),
            config.welcome_text.clone(),
        );
        let ingestor = StreamIngestor::new(config.apology_text.clone());

        tracing::info!(
            provider = provider.name(),
            model = %config.model,
            turns = store.log().len(),
            "Assistant ready"
        );

        Self {
            provider,
            store,
            input: InputController::new(),
            ingestor,
            config,
            tx,
            surface_gone: false,
        }
    }

    /// Send the current state and every stored turn to the surface
    pub async fn start(&mut self) {
        self.send(AssistantMessage::State {
            state: self.ingestor.state(),
        })
        .await;

        let turns: Vec<Message> = self.store.log().messages().to_vec();
        for (index, message) in turns.into_iter().enumerate() {
            self.send(AssistantMessage::TurnAppended { index, message })
                .await;
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The conversation log
    #[must_use]
    pub fn log(&self) -> &ConversationLog {
        self.store.log()
    }

    /// The conversation store
    #[must_use]
    pub fn store(&self) -> &ConversationStore<S> {
        &self.store
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Authored text and selection
    #[must_use]
    pub fn input(&self) -> &InputController {
        &self.input
    }

    /// Mutable access to the authored text
    pub fn input_mut(&mut self) -> &mut InputController {
        &mut self.input
    }

    /// Current exchange state
    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.ingestor.state()
    }

    /// Whether a response is outstanding (typing indicator, send disabled)
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.ingestor.is_in_flight()
    }

    // ========================================================================
    // Surface Events
    // ========================================================================

    /// Handle an event from the surface
    pub async fn handle_event(&mut self, event: SurfaceEvent) {
        match event {
            SurfaceEvent::TextChanged { text } => self.input.set_text(text),
            SurfaceEvent::SelectionChanged { start, end } => self.input.select(start, end),
            SurfaceEvent::FocusChanged { focused: true } => self.input.focus(),
            SurfaceEvent::FocusChanged { focused: false } => self.input.blur(),
            SurfaceEvent::KeyPressed { key, modifier } => {
                self.apply_shortcut(key, modifier);
            }
            SurfaceEvent::EnterPressed { shift } => {
                if self.input.handle_enter(shift) {
                    self.submit().await;
                }
            }
            SurfaceEvent::SendClicked => {
                self.submit().await;
            }
            SurfaceEvent::ClearInput => self.clear_input(),
            SurfaceEvent::ClearHistory { confirmed } => {
                self.clear(confirmed).await;
            }
        }
    }

    /// Forward a key to the shortcut table
    pub fn apply_shortcut(&mut self, key: char, modifier: bool) -> bool {
        self.input.apply_shortcut(key, modifier)
    }

    /// Wrap the current selection in `style`
    pub fn toggle_style(&mut self, style: Style) {
        self.input.toggle_style(style);
    }

    /// Empty the authored text
    pub fn clear_input(&mut self) {
        self.input.clear();
    }

    // ========================================================================
    // Exchange
    // ========================================================================

    /// Send the authored text
    ///
    /// No-op (returns `false`) when the text is blank or a response is still
    /// in flight. Otherwise the user turn is stored, the input is cleared,
    /// and a request seeded with every earlier turn is sent. A provider that
    /// rejects outright leaves an apology turn and the `Failed` state.
    pub async fn submit(&mut self) -> bool {
        let Some(text) = self.input.take_submission(self.ingestor.is_in_flight()) else {
            return false;
        };

        // History is every turn before the new one
        let history = self.store.log().history();

        let message = Message::user(text.clone());
        let index = self.store.append(message.clone());
        self.send(AssistantMessage::TurnAppended { index, message })
            .await;

        let events = self.ingestor.begin();
        self.send_all(events).await;

        let mut request = CompletionRequest::new(text, self.config.model.clone())
            .with_history(history)
            .with_temperature(self.config.temperature);
        if !self.config.system_prompt.trim().is_empty() {
            request = request.with_system(self.config.system_prompt.clone());
        }

        tracing::info!(
            index,
            history = request.history.len(),
            model = %request.model,
            "Submitting message"
        );

        match self.provider.send_streaming(&request).await {
            Ok(rx) => self.ingestor.attach(rx),
            Err(e) => {
                let events = self.ingestor.reject(&mut self.store, &e.to_string());
                self.send_all(events).await;
            }
        }
        true
    }

    /// Apply whatever the provider has delivered so far (non-blocking)
    ///
    /// Returns `true` if there was activity.
    pub async fn poll_streaming(&mut self) -> bool {
        let events = self.ingestor.poll(&mut self.store);
        if events.is_empty() {
            return false;
        }
        self.send_all(events).await;
        true
    }

    /// Drive the outstanding exchange to a terminal state
    pub async fn finish_streaming(&mut self) -> ExchangeState {
        while self.ingestor.is_in_flight() && self.ingestor.is_attached() {
            let events = self.ingestor.next(&mut self.store).await;
            self.send_all(events).await;
        }
        self.ingestor.state()
    }

    /// Reset the conversation to the welcome turn
    ///
    /// Only when `confirmed` and nothing is in flight. Returns whether the
    /// history was cleared.
    pub async fn clear(&mut self, confirmed: bool) -> bool {
        if !confirmed {
            return false;
        }
        if self.ingestor.is_in_flight() {
            tracing::warn!("Refusing to clear history while a response is in flight");
            return false;
        }

        self.store.reset();
        self.ingestor.reset();
        self.send(AssistantMessage::Cleared).await;
        self.send(AssistantMessage::State {
            state: self.ingestor.state(),
        })
        .await;
        true
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    async fn send_all(&mut self, events: Vec<AssistantMessage>) {
        for event in events {
            self.send(event).await;
        }
    }

    /// Send a notification; a missing surface never stops the exchange
    async fn send(&mut self, msg: AssistantMessage) {
        if self.surface_gone {
            return;
        }
        if let Err(e) = self.tx.send(msg).await {
            self.surface_gone = true;
            tracing::warn!("Failed to send message to surface: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedProvider;
    use crate::storage::MemoryStorage;

    fn assistant(
        provider: ScriptedProvider,
    ) -> (
        Assistant<ScriptedProvider, MemoryStorage>,
        mpsc::Receiver<AssistantMessage>,
    ) {
        let (tx, rx) = mpsc::channel(256);
        let assistant = Assistant::new(
            Arc::new(provider),
            Arc::new(MemoryStorage::new()),
            AssistantConfig::default(),
            tx,
        );
        (assistant, rx)
    }

    #[tokio::test]
    async fn test_assistant_creation() {
        let (assistant, _rx) = assistant(ScriptedProvider::new());
        assert_eq!(assistant.state(), ExchangeState::Idle);
        assert!(!assistant.is_busy());
        assert_eq!(assistant.log().len(), 1);
        assert_eq!(
            assistant.log().messages()[0].text,
            crate::config::DEFAULT_WELCOME_TEXT
        );
    }

    #[tokio::test]
    async fn test_start_sends_snapshot() {
        let (mut assistant, mut rx) = assistant(ScriptedProvider::new());
        assistant.start().await;

        assert!(matches!(
            rx.recv().await,
            Some(AssistantMessage::State {
                state: ExchangeState::Idle
            })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(AssistantMessage::TurnAppended { index: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_blank_submit_is_noop() {
        let (mut assistant, _rx) = assistant(ScriptedProvider::new());
        assistant.input_mut().set_text("  ");
        assert!(!assistant.submit().await);
        assert_eq!(assistant.log().len(), 1);
    }

    #[tokio::test]
    async fn test_enter_event_submits_and_finishes() {
        let (mut assistant, _rx) = assistant(ScriptedProvider::new().then_text(["ok"]));

        assistant
            .handle_event(SurfaceEvent::TextChanged {
                text: "ጥያቄ".to_string(),
            })
            .await;
        assistant
            .handle_event(SurfaceEvent::EnterPressed { shift: false })
            .await;
        assert_eq!(assistant.input().text(), "");

        assert_eq!(assistant.finish_streaming().await, ExchangeState::Finalized);
        assert_eq!(assistant.log().len(), 3);
        assert_eq!(assistant.log().last().unwrap().text, "ok");
    }

    #[tokio::test]
    async fn test_shift_enter_does_not_submit() {
        let (mut assistant, _rx) = assistant(ScriptedProvider::new());
        assistant.input_mut().set_text("line");
        assistant
            .handle_event(SurfaceEvent::EnterPressed { shift: true })
            .await;
        assert_eq!(assistant.input().text(), "line\n");
        assert_eq!(assistant.log().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_requires_confirmation() {
        let (mut assistant, _rx) = assistant(ScriptedProvider::new().then_text(["a"]));
        assistant.input_mut().set_text("q");
        assistant.submit().await;
        assistant.finish_streaming().await;
        assert_eq!(assistant.log().len(), 3);

        assert!(!assistant.clear(false).await);
        assert_eq!(assistant.log().len(), 3);

        assert!(assistant.clear(true).await);
        assert_eq!(assistant.log().len(), 1);
        assert_eq!(assistant.state(), ExchangeState::Idle);
    }

    #[tokio::test]
    async fn test_clear_refused_while_in_flight() {
        let provider = ScriptedProvider::new();
        let stream = provider.push_manual();
        let (mut assistant, _rx) = assistant(provider);

        assistant.input_mut().set_text("q");
        assistant.submit().await;
        assert!(assistant.is_busy());
        assert!(!assistant.clear(true).await);

        drop(stream);
        assistant.finish_streaming().await;
        assert!(assistant.clear(true).await);
    }

    #[tokio::test]
    async fn test_keyboard_shortcut_event() {
        let (mut assistant, _rx) = assistant(ScriptedProvider::new());
        assistant
            .handle_event(SurfaceEvent::TextChanged {
                text: "VAT".to_string(),
            })
            .await;
        assistant
            .handle_event(SurfaceEvent::SelectionChanged { start: 0, end: 3 })
            .await;
        assistant
            .handle_event(SurfaceEvent::KeyPressed {
                key: 'i',
                modifier: true,
            })
            .await;
        assert_eq!(assistant.input().text(), "_VAT_");

        assistant.handle_event(SurfaceEvent::ClearInput).await;
        assert_eq!(assistant.input().text(), "");
    }

    #[tokio::test]
    async fn test_shortcut_restores_focus_after_blur() {
        let (mut assistant, _rx) = assistant(ScriptedProvider::new());
        assistant.input_mut().set_text("TIN");
        assistant
            .handle_event(SurfaceEvent::FocusChanged { focused: true })
            .await;
        assert!(assistant.input().is_focused());

        // A toolbar click takes focus away from the field
        assistant
            .handle_event(SurfaceEvent::FocusChanged { focused: false })
            .await;
        assert!(!assistant.input().is_focused());

        assistant
            .handle_event(SurfaceEvent::SelectionChanged { start: 0, end: 3 })
            .await;
        assistant
            .handle_event(SurfaceEvent::KeyPressed {
                key: 'B',
                modifier: true,
            })
            .await;
        assert_eq!(assistant.input().text(), "**TIN**");
        assert!(assistant.input().is_focused());
    }
}
