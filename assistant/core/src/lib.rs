//! Assistant Core - Message-Exchange Engine for the Semera-Logia Revenues Office
//!
//! This crate holds the conversational assistant's engine, independent of
//! any UI framework. It can drive a terminal, a web view, or run headless
//! for tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         UI Surfaces                              │
//! │        ┌──────────────┐   ┌──────────┐   ┌──────────────┐        │
//! │        │   Terminal   │   │ Web view │   │ Test harness │        │
//! │        └──────┬───────┘   └────┬─────┘   └──────┬───────┘        │
//! │               └────────────────┼────────────────┘                │
//! │                     SurfaceEvent (up)                            │
//! │                   AssistantMessage (down)                        │
//! └────────────────────────────────┼─────────────────────────────────┘
//!                                  │
//! ┌────────────────────────────────┼─────────────────────────────────┐
//! │                          ASSISTANT CORE                          │
//! │  ┌─────────────────────────────┴──────────────────────────────┐  │
//! │  │                         Assistant                           │  │
//! │  │  ┌─────────────────┐  ┌────────────────┐  ┌─────────────┐  │  │
//! │  │  │ InputController │  │ StreamIngestor │  │ Completion  │  │  │
//! │  │  │   + markup      │  │ + citations    │  │  Provider   │  │  │
//! │  │  └─────────────────┘  └───────┬────────┘  └─────────────┘  │  │
//! │  │                       ┌───────┴───────────┐                │  │
//! │  │                       │ ConversationStore │── Storage      │  │
//! │  │                       └───────────────────┘                │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use assistant_core::{Assistant, AssistantConfig, FileStorage, GeminiBackend};
//! use tokio::sync::mpsc;
//!
//! let config = assistant_core::load_config()?;
//! let backend = GeminiBackend::new(&config.api_base, api_key, config.request_timeout)?;
//! let storage = FileStorage::new(config.resolved_data_dir().unwrap());
//!
//! let (tx, mut rx) = mpsc::channel(100);
//! let mut assistant = Assistant::new(Arc::new(backend), Arc::new(storage), config, tx);
//!
//! assistant.input_mut().set_text("ታክስ ክፍያ መቼ ይፈጸማል?");
//! assistant.submit().await;
//! assistant.finish_streaming().await;
//! ```
//!
//! # Module Overview
//!
//! - [`assistant`]: Main Assistant struct
//! - [`backend`]: Streaming completion providers (Gemini, scripted)
//! - [`citations`]: Per-turn citation deduplication
//! - [`config`]: TOML, environment and CLI configuration
//! - [`conversation`]: Conversation log and its persistence lifecycle
//! - [`events`]: Events from UI surfaces to the Assistant
//! - [`input`]: Authored text, selection, and formatting shortcuts
//! - [`markup`]: Inline bold/italic/underline markup
//! - [`messages`]: Turns, citations, and notifications to UI surfaces
//! - [`storage`]: Persistence adapters
//! - [`streaming`]: The exchange state machine

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assistant;
pub mod backend;
pub mod citations;
pub mod config;
pub mod conversation;
pub mod events;
pub mod input;
pub mod markup;
pub mod messages;
pub mod storage;
pub mod streaming;

// Re-exports for convenience
pub use assistant::Assistant;
pub use backend::{
    CompletionProvider, CompletionRequest, GeminiBackend, ProviderError, ScriptedProvider,
    StreamChunk, StreamingToken,
};
pub use citations::CitationRegistry;
pub use config::{
    default_config_path, load_config, load_config_from_path, AssistantConfig, ConfigError,
    ConfigOverrides, ConfigSource,
};
pub use conversation::{ConversationLog, ConversationStore, InvalidStateError};
pub use events::SurfaceEvent;
pub use input::InputController;
pub use markup::{render, toggle_style, Segment, Style, Toggled};
pub use messages::{AssistantMessage, Citation, ExchangeState, HistoryTurn, Message, Role};
pub use storage::{FileStorage, MemoryStorage, PersistenceError, Storage};
pub use streaming::{StreamIngestor, StreamState};
