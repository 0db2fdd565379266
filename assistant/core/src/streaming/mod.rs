//! Response Streaming
//!
//! Turns a provider's ordered token channel into incremental updates of a
//! single bot turn.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   mpsc::Receiver    ┌────────────────┐  update_last  ┌───────────────────┐
//! │  Completion  │ ──StreamingToken──▶ │ StreamIngestor │ ────────────▶ │ ConversationStore │
//! │   Provider   │                     │ + StreamState  │               └───────────────────┘
//! └──────────────┘                     └───────┬────────┘
//!                                              │ Vec<AssistantMessage>
//!                                              ▼
//!                                           surface
//! ```
//!
//! Exactly one exchange is in flight at a time. Chunks are applied in
//! arrival order and each one is persisted before the next is read, so the
//! stored log is never behind the last chunk processed.
//!
//! # Example
//!
//! ```ignore
//! use assistant_core::streaming::StreamIngestor;
//!
//! let mut ingestor = StreamIngestor::new(apology);
//! ingestor.begin();
//! ingestor.attach(provider.send_streaming(&request).await?);
//!
//! while ingestor.is_in_flight() {
//!     for event in ingestor.next(&mut store).await {
//!         surface.render(event);
//!     }
//! }
//! ```

mod ingestor;

pub use ingestor::{StreamIngestor, StreamState};

pub use crate::backend::StreamingToken;
