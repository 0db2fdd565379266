//! Completion Provider Integration
//!
//! This module provides abstracted access to streaming completion providers
//! through a common trait interface.
//!
//! # Available Providers
//!
//! - **Gemini**: hosted model with web search grounding (default)
//! - **Scripted**: deterministic replay for tests and offline use
//!
//! # Usage
//!
//! ```ignore
//! use assistant_core::backend::{CompletionProvider, CompletionRequest, GeminiBackend};
//!
//! let backend = GeminiBackend::new(DEFAULT_API_BASE, api_key, None)?;
//! let request = CompletionRequest::new("ታክስ ክፍያ መቼ ይፈጸማል?", "gemini-3-flash-preview");
//! let rx = backend.send_streaming(&request).await?;
//! ```

mod gemini;
mod scripted;
mod traits;

pub use gemini::{GeminiBackend, DEFAULT_API_BASE};
pub use scripted::{Script, ScriptedProvider};
pub use traits::{
    CompletionProvider, CompletionRequest, ProviderError, StreamChunk, StreamingToken,
};
