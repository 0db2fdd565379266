//! Scripted Provider
//!
//! A deterministic in-process provider. Each request consumes the next
//! queued [`Script`]; when the queue is empty the provider echoes the user
//! message back word by word. Used by tests and by the terminal's offline
//! mode.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::traits::{
    CompletionProvider, CompletionRequest, ProviderError, StreamChunk, StreamingToken,
};

/// What the provider does for one request
#[derive(Debug)]
pub enum Script {
    /// Deliver these events in order, then end the stream
    Tokens(Vec<StreamingToken>),
    /// Reject the request before streaming
    Reject(String),
    /// Hand the stream to a test-held sender
    Manual(mpsc::Receiver<StreamingToken>),
}

/// Provider that replays queued scripts
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    /// Create a provider with an empty queue (echo mode)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response made of text chunks
    #[must_use]
    pub fn then_text<I, T>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tokens = chunks
            .into_iter()
            .map(|t| StreamingToken::Chunk(StreamChunk::text(t)))
            .collect();
        self.then_tokens(tokens)
    }

    /// Queue a response made of arbitrary stream events
    #[must_use]
    pub fn then_tokens(self, tokens: Vec<StreamingToken>) -> Self {
        self.push(Script::Tokens(tokens));
        self
    }

    /// Queue a rejection
    #[must_use]
    pub fn then_reject(self, reason: impl Into<String>) -> Self {
        self.push(Script::Reject(reason.into()));
        self
    }

    /// Queue a stream driven by the returned sender
    pub fn push_manual(&self) -> mpsc::Sender<StreamingToken> {
        let (tx, rx) = mpsc::channel(64);
        self.push(Script::Manual(rx));
        tx
    }

    /// Queue a script
    pub fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    /// Every request received so far
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    fn echo(message: &str) -> Vec<StreamingToken> {
        message
            .split_inclusive(' ')
            .map(|word| StreamingToken::Chunk(StreamChunk::text(word)))
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn send_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, ProviderError> {
        self.requests.lock().push(request.clone());

        let script = self.scripts.lock().pop_front();
        let tokens = match script {
            Some(Script::Reject(reason)) => return Err(ProviderError::Rejected(reason)),
            Some(Script::Manual(rx)) => return Ok(rx),
            Some(Script::Tokens(tokens)) => tokens,
            None => Self::echo(&request.message),
        };

        // Everything fits in the buffer, so the stream is complete on return.
        let (tx, rx) = mpsc::channel(tokens.len().max(1));
        for token in tokens {
            if tx.try_send(token).is_err() {
                break;
            }
        }
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(mut rx: mpsc::Receiver<StreamingToken>) -> Vec<StreamingToken> {
        let mut out = Vec::new();
        while let Some(token) = rx.recv().await {
            out.push(token);
        }
        out
    }

    #[tokio::test]
    async fn test_scripts_consumed_in_order() {
        let provider = ScriptedProvider::new()
            .then_text(["a", "b"])
            .then_reject("down");

        let first = provider
            .send_streaming(&CompletionRequest::new("q1", "m"))
            .await
            .unwrap();
        assert_eq!(
            drain(first).await,
            vec![
                StreamingToken::Chunk(StreamChunk::text("a")),
                StreamingToken::Chunk(StreamChunk::text("b")),
            ]
        );

        let second = provider.send_streaming(&CompletionRequest::new("q2", "m")).await;
        assert!(matches!(second, Err(ProviderError::Rejected(r)) if r == "down"));

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].message, "q2");
    }

    #[tokio::test]
    async fn test_echo_when_queue_empty() {
        let provider = ScriptedProvider::new();
        let rx = provider
            .send_streaming(&CompletionRequest::new("ሰላም ለእናንተ", "m"))
            .await
            .unwrap();

        let text: String = drain(rx)
            .await
            .into_iter()
            .filter_map(|t| match t {
                StreamingToken::Chunk(c) => c.text,
                StreamingToken::Error(_) => None,
            })
            .collect();
        assert_eq!(text, "ሰላም ለእናንተ");
    }

    #[tokio::test]
    async fn test_manual_stream() {
        let provider = ScriptedProvider::new();
        let tx = provider.push_manual();
        let mut rx = provider
            .send_streaming(&CompletionRequest::new("q", "m"))
            .await
            .unwrap();

        tx.send(StreamingToken::Chunk(StreamChunk::text("x")))
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(StreamingToken::Chunk(StreamChunk::text("x")))
        );
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
