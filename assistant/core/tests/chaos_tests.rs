//! Chaos Tests for Exchange Resilience
//!
//! These tests verify engine behavior under adverse conditions:
//! - Streams that break mid-answer
//! - Storage that fails every read and write
//! - A surface that disappears while a response is streaming
//! - Streams that close without producing anything

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use assistant_core::backend::{ScriptedProvider, StreamChunk, StreamingToken};
use assistant_core::config::{AssistantConfig, DEFAULT_APOLOGY_TEXT};
use assistant_core::messages::{AssistantMessage, Citation, ExchangeState, Message};
use assistant_core::storage::{MemoryStorage, PersistenceError, Storage};
use assistant_core::Assistant;

// =============================================================================
// Chaos Test Infrastructure
// =============================================================================

/// Storage that fails every operation and counts the attempts
#[derive(Default)]
struct FailingStorage {
    attempts: AtomicUsize,
}

impl FailingStorage {
    fn fail(&self, key: &str) -> PersistenceError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        PersistenceError::InvalidKey(key.to_string())
    }
}

impl Storage for FailingStorage {
    fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Err(self.fail(key))
    }

    fn write(&self, key: &str, _value: &str) -> Result<(), PersistenceError> {
        Err(self.fail(key))
    }

    fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        Err(self.fail(key))
    }
}

fn chunk(text: &str) -> StreamingToken {
    StreamingToken::Chunk(StreamChunk::text(text))
}

// =============================================================================
// Chaos Tests
// =============================================================================

/// A stream that breaks after content keeps the partial answer as-is.
#[tokio::test]
async fn chaos_stream_breaks_mid_answer() {
    let provider = ScriptedProvider::new().then_tokens(vec![
        chunk("የገቢ ግብር "),
        chunk("በየዓመቱ"),
        StreamingToken::Error("connection reset".to_string()),
    ]);
    let (tx, _rx) = mpsc::channel(256);
    let mut assistant = Assistant::new(
        Arc::new(provider),
        Arc::new(MemoryStorage::new()),
        AssistantConfig::default(),
        tx,
    );

    assistant.input_mut().set_text("q");
    assistant.submit().await;
    assert_eq!(assistant.finish_streaming().await, ExchangeState::Failed);

    let messages = assistant.log().messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2], Message::bot("የገቢ ግብር በየዓመቱ"));
    assert!(!assistant.log().is_in_flight());
    assert!(!assistant.is_busy());
}

/// Sources seen before the stream broke stay on the partial answer.
#[tokio::test]
async fn chaos_stream_breaks_after_citation() {
    let provider = ScriptedProvider::new().then_tokens(vec![
        StreamingToken::Chunk(
            StreamChunk::text("partial")
                .with_citations(vec![Citation::new("MoR", "https://mor.gov.et")]),
        ),
        StreamingToken::Error("reset".to_string()),
    ]);
    let storage = Arc::new(MemoryStorage::new());
    let (tx, _rx) = mpsc::channel(256);
    let mut assistant = Assistant::new(
        Arc::new(provider),
        Arc::clone(&storage),
        AssistantConfig::default(),
        tx,
    );

    assistant.input_mut().set_text("q");
    assistant.submit().await;
    assert_eq!(assistant.finish_streaming().await, ExchangeState::Failed);

    let expected = Some(vec![Citation::new("MoR", "https://mor.gov.et")]);
    let last = assistant.log().last().unwrap();
    assert_eq!(last.text, "partial");
    assert_eq!(last.citations, expected);

    let raw = storage.read(&assistant.config().storage_key).unwrap().unwrap();
    let stored: Vec<Message> = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored[2].citations, expected);
}

/// An error before any content is reported with the apology turn.
#[tokio::test]
async fn chaos_stream_errors_before_content() {
    let provider =
        ScriptedProvider::new().then_tokens(vec![StreamingToken::Error("overloaded".into())]);
    let (tx, _rx) = mpsc::channel(256);
    let mut assistant = Assistant::new(
        Arc::new(provider),
        Arc::new(MemoryStorage::new()),
        AssistantConfig::default(),
        tx,
    );

    assistant.input_mut().set_text("q");
    assistant.submit().await;
    assert_eq!(assistant.finish_streaming().await, ExchangeState::Failed);
    assert_eq!(
        assistant.log().last().unwrap(),
        &Message::bot(DEFAULT_APOLOGY_TEXT)
    );
}

/// Persistence failures never block the in-memory conversation.
#[tokio::test]
async fn chaos_storage_always_fails() {
    let storage = Arc::new(FailingStorage::default());
    let (tx, _rx) = mpsc::channel(256);
    let mut assistant = Assistant::new(
        Arc::new(ScriptedProvider::new().then_text(["a", "b"])),
        Arc::clone(&storage),
        AssistantConfig::default(),
        tx,
    );
    assert_eq!(assistant.log().len(), 1);

    assistant.input_mut().set_text("q");
    assistant.submit().await;
    assert_eq!(assistant.finish_streaming().await, ExchangeState::Finalized);

    assert_eq!(assistant.log().len(), 3);
    assert_eq!(assistant.log().last().unwrap().text, "ab");
    assert!(assistant.store().persist_failures() >= 3);
    assert!(storage.attempts.load(Ordering::SeqCst) >= 4);

    assert!(assistant.clear(true).await);
    assert_eq!(assistant.log().len(), 1);
}

/// A surface that stops listening does not cancel the exchange.
#[tokio::test]
async fn chaos_surface_dropped_mid_stream() {
    let provider = Arc::new(ScriptedProvider::new());
    let stream = provider.push_manual();
    let storage = Arc::new(MemoryStorage::new());
    let (tx, rx) = mpsc::channel(1);
    let mut assistant = Assistant::new(
        Arc::clone(&provider),
        Arc::clone(&storage),
        AssistantConfig::default(),
        tx,
    );

    assistant.input_mut().set_text("q");
    drop(rx);
    assistant.submit().await;

    let producer = tokio::spawn(async move {
        for part in ["background ", "completion"] {
            stream.send(chunk(part)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    assert_eq!(assistant.finish_streaming().await, ExchangeState::Finalized);
    producer.await.unwrap();

    assert_eq!(
        assistant.log().last().unwrap().text,
        "background completion"
    );

    // The stored copy is complete too
    let raw = storage.read(&assistant.config().storage_key).unwrap().unwrap();
    let stored: Vec<Message> = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[2].text, "background completion");
}

/// A stream that closes without a chunk finalizes without a bot turn.
#[tokio::test]
async fn chaos_empty_stream() {
    let (tx, mut rx) = mpsc::channel(256);
    let mut assistant = Assistant::new(
        Arc::new(ScriptedProvider::new().then_tokens(Vec::new())),
        Arc::new(MemoryStorage::new()),
        AssistantConfig::default(),
        tx,
    );

    assistant.input_mut().set_text("q");
    assistant.submit().await;
    assert_eq!(assistant.finish_streaming().await, ExchangeState::Finalized);
    assert_eq!(assistant.log().len(), 2);

    let mut saw_finalized_turn = false;
    while let Ok(msg) = rx.try_recv() {
        if matches!(msg, AssistantMessage::TurnFinalized { .. }) {
            saw_finalized_turn = true;
        }
    }
    assert!(!saw_finalized_turn);
}

/// Many exchanges in a row keep the log strictly alternating.
#[tokio::test]
async fn chaos_many_exchanges_alternate() {
    let mut provider = ScriptedProvider::new();
    for i in 0..20 {
        provider = if i % 5 == 4 {
            provider.then_reject("flaky")
        } else {
            provider.then_text([format!("answer {i}")])
        };
    }
    let (tx, _rx) = mpsc::channel(4096);
    let mut assistant = Assistant::new(
        Arc::new(provider),
        Arc::new(MemoryStorage::new()),
        AssistantConfig::default(),
        tx,
    );

    for i in 0..20 {
        assistant.input_mut().set_text(format!("question {i}"));
        assert!(assistant.submit().await);
        assistant.finish_streaming().await;
    }

    let messages = assistant.log().messages();
    assert_eq!(messages.len(), 1 + 40);
    for pair in messages[1..].chunks(2) {
        assert_eq!(pair[0].role, assistant_core::Role::User);
        assert_eq!(pair[1].role, assistant_core::Role::Bot);
    }
    assert_eq!(messages[10].text, DEFAULT_APOLOGY_TEXT);
}
