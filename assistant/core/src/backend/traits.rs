//! Completion Provider Traits
//!
//! Trait definitions for streaming completion providers. The engine talks to
//! a provider only through [`CompletionProvider::send_streaming`], so the
//! hosted model can be swapped (or replaced by a scripted fake in tests)
//! without touching conversation logic.
//!
//! # Stream contract
//!
//! - `send_streaming` returning `Err` means the provider rejected the request.
//! - Each [`StreamingToken::Chunk`] carries an optional text delta and
//!   optional citations, delivered in order.
//! - [`StreamingToken::Error`] means the stream broke; nothing follows it.
//! - The channel closing without an error is a normal end of stream.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::messages::{Citation, HistoryTurn};

/// Errors raised when opening a response stream
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure
    #[error("Provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("{provider} returned {status}: {body}")]
    Status {
        /// Provider name
        provider: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// The provider refused the request
    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    /// No credentials configured
    #[error("No API key configured for {0}")]
    MissingApiKey(&'static str),
}

/// One validated unit of a streaming response
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamChunk {
    /// Text to append to the bot turn
    pub text: Option<String>,
    /// Sources cited by this chunk (may repeat across chunks)
    pub citations: Option<Vec<Citation>>,
}

impl StreamChunk {
    /// A chunk carrying only text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            citations: None,
        }
    }

    /// A chunk carrying only citations
    #[must_use]
    pub fn citations(citations: Vec<Citation>) -> Self {
        Self {
            text: None,
            citations: Some(citations),
        }
    }

    /// Attach citations to a chunk
    #[must_use]
    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = Some(citations);
        self
    }

    /// Validate one raw `generateContent` payload
    ///
    /// Reads the first candidate only. Text parts are concatenated. A
    /// grounding chunk becomes a citation only when its `web.uri` and
    /// `web.title` are both non-empty strings; anything else is ignored.
    #[must_use]
    pub fn from_gemini_json(data: &Value) -> Self {
        let candidate = data.get("candidates").and_then(|c| c.get(0));

        let text: String = candidate
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter(|p| !p.get("thought").and_then(Value::as_bool).unwrap_or(false))
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        let citations: Vec<Citation> = candidate
            .and_then(|c| c.get("groundingMetadata"))
            .and_then(|m| m.get("groundingChunks"))
            .and_then(Value::as_array)
            .map(|chunks| {
                chunks
                    .iter()
                    .filter_map(|chunk| {
                        let web = chunk.get("web")?;
                        let uri = web.get("uri")?.as_str().filter(|s| !s.is_empty())?;
                        let title = web.get("title")?.as_str().filter(|s| !s.is_empty())?;
                        Some(Citation::new(title, uri))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            text: (!text.is_empty()).then_some(text),
            citations: (!citations.is_empty()).then_some(citations),
        }
    }
}

/// Stream events from a completion provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// An ordered chunk of the response
    Chunk(StreamChunk),
    /// The stream broke
    Error(String),
}

/// A request for one bot turn
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    /// The new user message
    pub message: String,
    /// Every prior turn, oldest first
    pub history: Vec<HistoryTurn>,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// System instruction
    pub system: Option<String>,
}

impl CompletionRequest {
    /// Create a request with empty history
    pub fn new(message: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
            model: model.into(),
            temperature: 0.2,
            system: None,
        }
    }

    /// Set prior turns
    #[must_use]
    pub fn with_history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set system instruction
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Streaming completion provider
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name (e.g. "Gemini")
    fn name(&self) -> &str;

    /// Open a response stream for `request`
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the provider rejects the request before
    /// any content is produced.
    async fn send_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, ProviderError>;
}
