//! Conversation Store
//!
//! Owns the ordered message log and its persistence lifecycle.
//!
//! # Design Philosophy
//!
//! The log is append-only. Only the last turn may change after it is
//! appended, and only while it is marked in flight (a bot answer that is
//! still streaming). Every mutation rewrites the whole log through the
//! [`Storage`] collaborator, so a crash can lose at most the latest change
//! and never corrupts earlier history.
//!
//! Persistence is best effort: a failed read degrades to the welcome-only
//! log and a failed write is logged and otherwise ignored. The in-memory log
//! is always authoritative for the running session.

use std::sync::Arc;

use thiserror::Error;

use crate::messages::{HistoryTurn, Message};
use crate::storage::Storage;

/// Contract violations on the store
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvalidStateError {
    /// The log holds no turn to mutate
    #[error("conversation log is empty")]
    EmptyLog,

    /// The tail turn is not being streamed
    #[error("last message is not in flight")]
    NotInFlight,
}

/// Ordered sequence of turns
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationLog {
    messages: Vec<Message>,
    in_flight: bool,
}

impl ConversationLog {
    /// A log holding only the welcome turn
    #[must_use]
    pub fn welcome(welcome: &Message) -> Self {
        Self {
            messages: vec![welcome.clone()],
            in_flight: false,
        }
    }

    /// All turns in order
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The tail turn
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log has no turns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether the tail turn is still being streamed
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Every turn reduced to the provider history shape
    #[must_use]
    pub fn history(&self) -> Vec<HistoryTurn> {
        self.messages.iter().map(HistoryTurn::from).collect()
    }
}

/// Single owner of the conversation log
pub struct ConversationStore<S: Storage> {
    storage: Arc<S>,
    key: String,
    welcome: Message,
    log: ConversationLog,
    persist_failures: u64,
}

impl<S: Storage> ConversationStore<S> {
    /// Open the store and load any persisted log
    pub fn open(storage: Arc<S>, key: impl Into<String>, welcome_text: impl Into<String>) -> Self {
        let welcome = Message::bot(welcome_text);
        let mut store = Self {
            storage,
            key: key.into(),
            log: ConversationLog::welcome(&welcome),
            welcome,
            persist_failures: 0,
        };
        store.load();
        store
    }

    /// Re-read the persisted log
    ///
    /// Absent, unreadable, or incompatible data yields the welcome-only log.
    pub fn load(&mut self) -> &ConversationLog {
        self.log = match self.storage.read(&self.key) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Message>>(&raw) {
                Ok(messages) if !messages.is_empty() => {
                    tracing::debug!(count = messages.len(), key = %self.key, "Restored conversation");
                    ConversationLog {
                        messages,
                        in_flight: false,
                    }
                }
                Ok(_) => ConversationLog::welcome(&self.welcome),
                Err(e) => {
                    tracing::warn!(error = %e, key = %self.key, "Stored conversation is unreadable, starting fresh");
                    ConversationLog::welcome(&self.welcome)
                }
            },
            Ok(None) => ConversationLog::welcome(&self.welcome),
            Err(e) => {
                tracing::warn!(error = %e, key = %self.key, "Failed to read stored conversation");
                ConversationLog::welcome(&self.welcome)
            }
        };
        &self.log
    }

    /// Read view of the log
    #[must_use]
    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Number of writes that failed since the store was opened
    #[must_use]
    pub fn persist_failures(&self) -> u64 {
        self.persist_failures
    }

    /// Append an immutable turn
    ///
    /// Any in-flight tail is sealed first. Returns the new turn's index.
    pub fn append(&mut self, message: Message) -> usize {
        self.log.in_flight = false;
        self.log.messages.push(message);
        self.persist();
        self.log.messages.len() - 1
    }

    /// Append a turn that stays mutable through [`Self::update_last`]
    pub fn append_in_flight(&mut self, message: Message) -> usize {
        let index = self.append(message);
        self.log.in_flight = true;
        index
    }

    /// Mutate the in-flight tail turn
    ///
    /// # Errors
    ///
    /// Returns [`InvalidStateError`] when the log is empty or the tail is not
    /// in flight. Nothing is persisted in that case.
    pub fn update_last<F>(&mut self, mutator: F) -> Result<&Message, InvalidStateError>
    where
        F: FnOnce(&mut Message),
    {
        if self.log.messages.is_empty() {
            return Err(InvalidStateError::EmptyLog);
        }
        if !self.log.in_flight {
            return Err(InvalidStateError::NotInFlight);
        }

        if let Some(last) = self.log.messages.last_mut() {
            mutator(last);
        }
        self.persist();
        self.log.messages.last().ok_or(InvalidStateError::EmptyLog)
    }

    /// Seal the in-flight tail so it can no longer change
    pub fn finish_last(&mut self) {
        self.log.in_flight = false;
    }

    /// Truncate to the welcome turn and erase the persisted copy
    pub fn reset(&mut self) {
        self.log = ConversationLog::welcome(&self.welcome);
        if let Err(e) = self.storage.remove(&self.key) {
            self.persist_failures += 1;
            tracing::warn!(error = %e, key = %self.key, "Failed to erase stored conversation");
        }
        tracing::info!("Conversation cleared");
    }

    /// Write the whole log; failures are logged and counted only
    fn persist(&mut self) {
        let result = serde_json::to_string(&self.log.messages)
            .map_err(crate::storage::PersistenceError::from)
            .and_then(|raw| self.storage.write(&self.key, &raw));

        if let Err(e) = result {
            self.persist_failures += 1;
            tracing::warn!(error = %e, key = %self.key, "Failed to persist conversation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Citation, Role};
    use crate::storage::{MemoryStorage, PersistenceError};
    use pretty_assertions::assert_eq;

    const KEY: &str = "chat";

    /// Storage whose every operation fails
    struct BrokenStorage;

    impl Storage for BrokenStorage {
        fn read(&self, key: &str) -> Result<Option<String>, PersistenceError> {
            Err(PersistenceError::InvalidKey(key.to_string()))
        }

        fn write(&self, key: &str, _value: &str) -> Result<(), PersistenceError> {
            Err(PersistenceError::InvalidKey(key.to_string()))
        }

        fn remove(&self, key: &str) -> Result<(), PersistenceError> {
            Err(PersistenceError::InvalidKey(key.to_string()))
        }
    }

    fn open(storage: &Arc<MemoryStorage>) -> ConversationStore<MemoryStorage> {
        ConversationStore::open(Arc::clone(storage), KEY, "welcome")
    }

    #[test]
    fn test_fresh_store_has_welcome_only() {
        let store = open(&Arc::new(MemoryStorage::new()));
        assert_eq!(store.log().len(), 1);
        assert_eq!(store.log().messages()[0], Message::bot("welcome"));
        assert!(!store.log().is_in_flight());
    }

    #[test]
    fn test_corrupt_or_incompatible_data_falls_back() {
        for raw in ["not json", r#"{"role":"user"}"#, r#"[{"role":"admin","text":"x"}]"#, "[]"] {
            let storage = Arc::new(MemoryStorage::with_entry(KEY, raw));
            let store = open(&storage);
            assert_eq!(store.log().messages(), &[Message::bot("welcome")], "input: {raw}");
        }
    }

    #[test]
    fn test_unreadable_storage_degrades_to_memory() {
        let mut store = ConversationStore::open(Arc::new(BrokenStorage), KEY, "welcome");
        assert_eq!(store.log().len(), 1);

        store.append(Message::user("hi"));
        assert_eq!(store.log().len(), 2);
        assert_eq!(store.persist_failures(), 1);

        store.reset();
        assert_eq!(store.log().len(), 1);
        assert_eq!(store.persist_failures(), 2);
    }

    #[test]
    fn test_append_persists_full_log() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = open(&storage);

        let index = store.append(Message::user("ታክስ"));
        assert_eq!(index, 1);

        let raw = storage.read(KEY).unwrap().unwrap();
        let stored: Vec<Message> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, vec![Message::bot("welcome"), Message::user("ታክስ")]);
    }

    #[test]
    fn test_load_append_load_round_trip() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = open(&storage);
        store.load();
        store.append(Message::user("የንግድ ፈቃድ እንዴት አድሳለሁ?"));

        let reloaded = store.load().clone();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.messages()[1].text, "የንግድ ፈቃድ እንዴት አድሳለሁ?");

        let other = open(&storage);
        assert_eq!(other.log(), &reloaded);
    }

    #[test]
    fn test_update_last_requires_in_flight() {
        let mut store = open(&Arc::new(MemoryStorage::new()));

        let err = store.update_last(|m| m.append("x")).unwrap_err();
        assert_eq!(err, InvalidStateError::NotInFlight);

        store.append_in_flight(Message::bot(""));
        store.update_last(|m| m.append("Hello ")).unwrap();
        let last = store.update_last(|m| m.append("world")).unwrap();
        assert_eq!(last.text, "Hello world");

        store.finish_last();
        assert_eq!(
            store.update_last(|m| m.append("!")),
            Err(InvalidStateError::NotInFlight)
        );
        assert_eq!(store.log().last().unwrap().text, "Hello world");
    }

    #[test]
    fn test_append_seals_previous_in_flight_turn() {
        let mut store = open(&Arc::new(MemoryStorage::new()));
        store.append_in_flight(Message::bot("partial"));
        store.append(Message::user("next"));

        assert!(!store.log().is_in_flight());
        assert!(store.update_last(|m| m.append("x")).is_err());
    }

    #[test]
    fn test_update_last_persists_each_call() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = open(&storage);
        store.append_in_flight(Message::bot(""));
        store
            .update_last(|m| {
                m.append("answer");
                m.citations = Some(vec![Citation::new("A", "x")]);
            })
            .unwrap();

        let reopened = open(&storage);
        let last = reopened.log().last().unwrap();
        assert_eq!(last.role, Role::Bot);
        assert_eq!(last.text, "answer");
        assert_eq!(last.citations.as_ref().unwrap().len(), 1);
        assert!(!reopened.log().is_in_flight());
    }

    #[test]
    fn test_reset_erases_persisted_copy() {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = open(&storage);
        store.append(Message::user("one"));
        store.append(Message::bot("two"));

        store.reset();
        assert_eq!(store.log().messages(), &[Message::bot("welcome")]);
        assert_eq!(storage.read(KEY).unwrap(), None);
    }

    #[test]
    fn test_history_covers_every_turn() {
        let mut store = open(&Arc::new(MemoryStorage::new()));
        store.append(Message::user("q"));
        store.append(Message::bot("a"));

        let history = store.log().history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].parts[0].text, "q");
    }
}
