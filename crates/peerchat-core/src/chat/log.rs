//! MessageLog trait definition and in-process implementations.
//!
//! A message log mirrors every conversation mutation to an external
//! append-only store keyed by `(owner_id, persona_id)`. Entries are keyed by
//! the message's own id, so recording the same message again replaces it and
//! replaying a log twice never duplicates messages.
//!
//! The in-memory `ConversationStore` stays authoritative: log failures are
//! logged by the caller and never roll back local state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use peerchat_types::error::RepositoryError;
use peerchat_types::message::{Message, MessageId};
use peerchat_types::persona::PersonaId;

/// Repository trait for conversation mirroring.
///
/// Implementations live here (memory, null) and in peerchat-infra (SQLite).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait MessageLog: Send + Sync + 'static {
    /// Insert or replace a message snapshot.
    fn record(
        &self,
        owner_id: &str,
        persona_id: &PersonaId,
        message: &Message,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Drop every entry of one conversation.
    fn clear_conversation(
        &self,
        owner_id: &str,
        persona_id: &PersonaId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All entries of `owner_id`, in first-recorded order.
    fn replay(
        &self,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<(PersonaId, Message)>, RepositoryError>> + Send;
}

/// Shared logs: several sessions (or a session and its restorer) may mirror
/// into the same store.
impl<T: MessageLog> MessageLog for Arc<T> {
    fn record(
        &self,
        owner_id: &str,
        persona_id: &PersonaId,
        message: &Message,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send {
        (**self).record(owner_id, persona_id, message)
    }

    fn clear_conversation(
        &self,
        owner_id: &str,
        persona_id: &PersonaId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send {
        (**self).clear_conversation(owner_id, persona_id)
    }

    fn replay(
        &self,
        owner_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<(PersonaId, Message)>, RepositoryError>> + Send {
        (**self).replay(owner_id)
    }
}

/// Log that stores nothing. Used for pure in-memory sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMessageLog;

impl MessageLog for NullMessageLog {
    async fn record(&self, _: &str, _: &PersonaId, _: &Message) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn clear_conversation(&self, _: &str, _: &PersonaId) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn replay(&self, _: &str) -> Result<Vec<(PersonaId, Message)>, RepositoryError> {
        Ok(Vec::new())
    }
}

struct LogEntry {
    owner_id: String,
    persona_id: PersonaId,
    seq: u64,
    message: Message,
}

/// Process-local log backed by a `DashMap`.
#[derive(Default)]
pub struct MemoryMessageLog {
    entries: DashMap<MessageId, LogEntry>,
    next_seq: AtomicU64,
}

impl MemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for MemoryMessageLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMessageLog")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl MessageLog for MemoryMessageLog {
    async fn record(
        &self,
        owner_id: &str,
        persona_id: &PersonaId,
        message: &Message,
    ) -> Result<(), RepositoryError> {
        match self.entries.get_mut(&message.id) {
            Some(mut entry) => {
                if entry.owner_id != owner_id || &entry.persona_id != persona_id {
                    return Err(RepositoryError::Conflict(format!(
                        "message {} belongs to another conversation",
                        message.id
                    )));
                }
                entry.message = message.clone();
            }
            None => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                self.entries.insert(
                    message.id,
                    LogEntry {
                        owner_id: owner_id.to_string(),
                        persona_id: persona_id.clone(),
                        seq,
                        message: message.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn clear_conversation(
        &self,
        owner_id: &str,
        persona_id: &PersonaId,
    ) -> Result<(), RepositoryError> {
        self.entries
            .retain(|_, e| !(e.owner_id == owner_id && &e.persona_id == persona_id));
        Ok(())
    }

    async fn replay(&self, owner_id: &str) -> Result<Vec<(PersonaId, Message)>, RepositoryError> {
        let mut rows: Vec<(u64, PersonaId, Message)> = self
            .entries
            .iter()
            .filter(|e| e.owner_id == owner_id)
            .map(|e| (e.seq, e.persona_id.clone(), e.message.clone()))
            .collect();
        rows.sort_by_key(|(seq, _, _)| *seq);
        Ok(rows.into_iter().map(|(_, p, m)| (p, m)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerchat_types::message::{DeliveryStatus, MessageKind};

    #[tokio::test]
    async fn record_is_upsert_by_message_id() {
        let log = MemoryMessageLog::new();
        let p1 = PersonaId::from("p1");
        let mut msg = Message::user("Hi", MessageKind::Text);

        log.record("alice", &p1, &msg).await.unwrap();
        msg.status = DeliveryStatus::Sent;
        log.record("alice", &p1, &msg).await.unwrap();

        let replayed = log.replay("alice").await.unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].1.status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn replay_preserves_first_record_order() {
        let log = MemoryMessageLog::new();
        let p1 = PersonaId::from("p1");
        let mut first = Message::system("greeting");
        let second = Message::bot("reply");

        log.record("alice", &p1, &first).await.unwrap();
        log.record("alice", &p1, &second).await.unwrap();
        first.reactions.clear();
        log.record("alice", &p1, &first).await.unwrap();

        let replayed = log.replay("alice").await.unwrap();
        assert_eq!(replayed[0].1.id, first.id);
        assert_eq!(replayed[1].1.id, second.id);
    }

    #[tokio::test]
    async fn replay_is_scoped_to_owner() {
        let log = MemoryMessageLog::new();
        log.record("alice", &"p1".into(), &Message::bot("a")).await.unwrap();
        log.record("bob", &"p1".into(), &Message::bot("b")).await.unwrap();

        assert_eq!(log.replay("alice").await.unwrap().len(), 1);
        assert_eq!(log.replay("carol").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn record_into_other_conversation_conflicts() {
        let log = MemoryMessageLog::new();
        let msg = Message::bot("a");
        log.record("alice", &"p1".into(), &msg).await.unwrap();
        let err = log.record("alice", &"p2".into(), &msg).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn clear_conversation_only_touches_one_persona() {
        let log = MemoryMessageLog::new();
        log.record("alice", &"p1".into(), &Message::bot("a")).await.unwrap();
        log.record("alice", &"p2".into(), &Message::bot("b")).await.unwrap();

        log.clear_conversation("alice", &"p1".into()).await.unwrap();
        let replayed = log.replay("alice").await.unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].0, PersonaId::from("p2"));
    }

    #[tokio::test]
    async fn null_log_stores_nothing() {
        let log = NullMessageLog;
        log.record("alice", &"p1".into(), &Message::bot("a")).await.unwrap();
        assert!(log.replay("alice").await.unwrap().is_empty());
    }
}
