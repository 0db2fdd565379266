//! Gemini Backend Implementation
//!
//! Completion provider for the hosted Gemini API.
//!
//! # Gemini API
//!
//! - `POST /models/{model}:streamGenerateContent?alt=sse` streams a response
//!   as server-sent events, one `data: {json}` line per chunk.
//!
//! The request carries the prior turns as `contents`, the revenue-office
//! system instruction, and the web search tool so answers can cite sources
//! through grounding metadata.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::traits::{
    CompletionProvider, CompletionRequest, ProviderError, StreamChunk, StreamingToken,
};
use crate::messages::{HistoryRole, HistoryTurn};

/// Default API root
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini backend client
#[derive(Clone)]
pub struct GeminiBackend {
    /// API root URL
    api_base: String,
    /// API key sent as `x-goog-api-key`
    api_key: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl GeminiBackend {
    /// Create a backend
    ///
    /// `request_timeout` bounds the whole request including the streamed
    /// body; `None` leaves it unbounded.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the HTTP client cannot be built.
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey("Gemini"));
        }

        let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(10));
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            http_client: builder.build()?,
        })
    }

    /// Streaming endpoint for `model`
    fn stream_url(&self, model: &str) -> String {
        format!("{}/models/{model}:streamGenerateContent?alt=sse", self.api_base)
    }

    /// Build the JSON request body
    fn build_body(request: &CompletionRequest) -> Value {
        let mut contents: Vec<HistoryTurn> = request.history.clone();
        contents.push(HistoryTurn::new(HistoryRole::User, request.message.clone()));

        let mut body = json!({
            "contents": contents,
            "tools": [{"googleSearch": {}}],
            "generationConfig": {"temperature": request.temperature},
        });

        if let Some(ref system) = request.system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        body
    }
}

/// Outcome of one SSE line
#[derive(Debug, PartialEq)]
enum SseLine {
    /// A payload to forward
    Chunk(StreamChunk),
    /// The provider reported an error inside the stream
    Error(String),
    /// Comment, keep-alive, or unparsable data
    Skip,
}

/// Parse one line of the SSE body
fn parse_sse_line(line: &str) -> SseLine {
    let Some(payload) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return SseLine::Skip;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(data) => {
            if let Some(error) = data.get("error") {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown provider error");
                return SseLine::Error(message.to_string());
            }
            SseLine::Chunk(StreamChunk::from_gemini_json(&data))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed stream payload");
            SseLine::Skip
        }
    }
}

#[async_trait]
impl CompletionProvider for GeminiBackend {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn send_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, ProviderError> {
        let (tx, rx) = mpsc::channel(100);

        let response = self
            .http_client
            .post(self.stream_url(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_body(request))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: "Gemini",
                status,
                body,
            });
        }

        let mut stream = response.bytes_stream();

        // Spawn task to process stream
        tokio::spawn(async move {
            // Raw bytes so multi-byte characters split across reads stay intact
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);

                        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=pos).collect();
                            let line = String::from_utf8_lossy(&line);

                            match parse_sse_line(line.trim()) {
                                SseLine::Chunk(chunk) => {
                                    if tx.send(StreamingToken::Chunk(chunk)).await.is_err() {
                                        // Receiver dropped, stop streaming
                                        return;
                                    }
                                }
                                SseLine::Error(message) => {
                                    let _ = tx.send(StreamingToken::Error(message)).await;
                                    return;
                                }
                                SseLine::Skip => {}
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(StreamingToken::Error(e.to_string())).await;
                        return;
                    }
                }
            }

            // Trailing line without newline
            let rest = String::from_utf8_lossy(&buffer);
            match parse_sse_line(rest.trim()) {
                SseLine::Chunk(chunk) => {
                    let _ = tx.send(StreamingToken::Chunk(chunk)).await;
                }
                SseLine::Error(message) => {
                    let _ = tx.send(StreamingToken::Error(message)).await;
                }
                SseLine::Skip => {}
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Citation;

    #[test]
    fn test_gemini_backend_creation() {
        let backend = GeminiBackend::new("https://example.com/v1beta/", "key", None).unwrap();
        assert_eq!(backend.api_base, "https://example.com/v1beta");
        assert_eq!(
            backend.stream_url("gemini-3-flash-preview"),
            "https://example.com/v1beta/models/gemini-3-flash-preview:streamGenerateContent?alt=sse"
        );
        assert_eq!(backend.name(), "Gemini");
    }

    #[test]
    fn test_missing_api_key() {
        assert!(matches!(
            GeminiBackend::new(DEFAULT_API_BASE, "  ", None),
            Err(ProviderError::MissingApiKey("Gemini"))
        ));
    }

    #[test]
    fn test_build_body() {
        let request = CompletionRequest::new("ታክስ ክፍያ መቼ ይፈጸማል?", "m")
            .with_history(vec![HistoryTurn::new(HistoryRole::Model, "welcome")])
            .with_system("You are helpful");

        let body = GeminiBackend::build_body(&request);
        assert_eq!(body["contents"][0]["role"], "model");
        assert_eq!(body["contents"][1]["role"], "user");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "ታክስ ክፍያ መቼ ይፈጸማል?");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are helpful");
        assert!(body["tools"][0].get("googleSearch").is_some());
        assert!(body["generationConfig"]["temperature"].as_f64().is_some());

        let bare = GeminiBackend::build_body(&CompletionRequest::new("hi", "m"));
        assert!(bare.get("systemInstruction").is_none());
    }

    #[test]
    fn test_parse_sse_lines() {
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line("data: not json"), SseLine::Skip);

        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"ሰላም"}]},"groundingMetadata":{"groundingChunks":[{"web":{"uri":"u","title":"t"}}]}}]}"#;
        assert_eq!(
            parse_sse_line(line),
            SseLine::Chunk(StreamChunk::text("ሰላም").with_citations(vec![Citation::new("t", "u")]))
        );

        assert_eq!(
            parse_sse_line(r#"data: {"error":{"code":500,"message":"internal"}}"#),
            SseLine::Error("internal".to_string())
        );
    }
}
