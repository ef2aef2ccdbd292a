//! Per-persona conversation storage.
//!
//! Each conversation is an `Arc<Vec<Message>>` so readers can hold cheap
//! snapshots while writers copy-on-write through `Arc::make_mut`. A global
//! `MessageId -> (PersonaId, position)` index makes id-only lookups O(1);
//! positions stay valid because conversations are only ever appended to or
//! cleared wholesale.
//!
//! The store performs no feature gating. The session consults
//! `Entitlements` before calling the gated mutations.

use std::collections::HashMap;
use std::sync::Arc;

use peerchat_types::message::{DeliveryStatus, Message, MessageId, MessageKind, Sender};
use peerchat_types::persona::{Persona, PersonaId};
use tracing::debug;

/// Read-only view of one conversation.
pub type ConversationSnapshot = Arc<Vec<Message>>;

#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    conversations: HashMap<PersonaId, ConversationSnapshot>,
    index: HashMap<MessageId, (PersonaId, usize)>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a conversation with `persona` exists and is not empty.
    ///
    /// A missing or cleared conversation is seeded with the persona's system
    /// greeting, which is returned. Existing conversations are untouched.
    pub fn ensure_conversation(&mut self, persona: &Persona) -> Option<Message> {
        let needs_seed = self
            .conversations
            .get(&persona.id)
            .is_none_or(|c| c.is_empty());
        if !needs_seed {
            return None;
        }
        let greeting = Message::system(persona.greeting());
        self.push(&persona.id, greeting.clone());
        debug!(persona_id = %persona.id, "seeded conversation greeting");
        Some(greeting)
    }

    /// Append a user message with `status = Sending`.
    ///
    /// Text longer than `text_limit` characters is silently truncated; media
    /// payload references are never truncated.
    pub fn append_user_message(
        &mut self,
        persona_id: &PersonaId,
        content: &str,
        kind: MessageKind,
        text_limit: Option<usize>,
    ) -> Message {
        let content = match (kind, text_limit) {
            (MessageKind::Text, Some(limit)) => truncate_chars(content, limit),
            _ => content.to_string(),
        };
        let message = Message::user(content, kind);
        self.push(persona_id, message.clone());
        message
    }

    /// Append a scripted bot reply.
    pub fn append_bot_message(&mut self, persona_id: &PersonaId, content: &str) -> Message {
        let message = Message::bot(content);
        self.push(persona_id, message.clone());
        message
    }

    /// Set the status if `next` is ahead of the current one.
    ///
    /// Returns the updated message, or `None` for a lookup miss or a
    /// non-advancing transition.
    pub fn advance_status(
        &mut self,
        persona_id: &PersonaId,
        message_id: MessageId,
        next: DeliveryStatus,
    ) -> Option<Message> {
        let message = self.message_mut(persona_id, message_id)?;
        if message.sender != Sender::User || !message.advance_status(next) {
            return None;
        }
        Some(message.clone())
    }

    /// Move every user message of the conversation to `Read`.
    ///
    /// Returns the messages that actually changed.
    pub fn mark_all_user_messages_read(&mut self, persona_id: &PersonaId) -> Vec<Message> {
        let Some(conversation) = self.conversations.get_mut(persona_id) else {
            return Vec::new();
        };
        if !conversation
            .iter()
            .any(|m| m.sender == Sender::User && m.status < DeliveryStatus::Read)
        {
            return Vec::new();
        }
        Arc::make_mut(conversation)
            .iter_mut()
            .filter(|m| m.sender == Sender::User)
            .filter_map(|m| m.advance_status(DeliveryStatus::Read).then(|| m.clone()))
            .collect()
    }

    /// Link `message_id` to the message it replies to.
    ///
    /// The target must currently exist; once set, the link is a weak
    /// reference and may dangle after the target's conversation is deleted.
    pub fn attach_reply(
        &mut self,
        persona_id: &PersonaId,
        message_id: MessageId,
        reply_to: MessageId,
    ) -> Option<Message> {
        if message_id == reply_to || !self.index.contains_key(&reply_to) {
            return None;
        }
        let message = self.message_mut(persona_id, message_id)?;
        message.reply_to = Some(reply_to);
        Some(message.clone())
    }

    /// Add or remove a `(emoji, user_id)` reaction.
    pub fn toggle_reaction(
        &mut self,
        persona_id: &PersonaId,
        message_id: MessageId,
        emoji: &str,
        user_id: &str,
    ) -> Option<Message> {
        let message = self.message_mut(persona_id, message_id)?;
        if message.is_deleted {
            return None;
        }
        message.toggle_reaction(emoji, user_id);
        Some(message.clone())
    }

    /// Replace the translation of a text message. Media is not translatable.
    pub fn set_translation(
        &mut self,
        persona_id: &PersonaId,
        message_id: MessageId,
        language: &str,
        text: &str,
    ) -> Option<Message> {
        let message = self.message_mut(persona_id, message_id)?;
        if !message.kind.is_text() || message.is_deleted {
            return None;
        }
        message.set_translation(language, text);
        Some(message.clone())
    }

    /// Tombstone a user-authored message. Content is kept.
    pub fn unsend(&mut self, persona_id: &PersonaId, message_id: MessageId) -> Option<Message> {
        let message = self.message_mut(persona_id, message_id)?;
        if message.sender != Sender::User || message.is_deleted {
            return None;
        }
        message.is_deleted = true;
        Some(message.clone())
    }

    /// Clear a conversation entirely (no tombstones).
    ///
    /// The conversation entry itself is kept, empty, so the persona still
    /// counts as having a conversation. Returns `false` if there was none.
    pub fn delete_conversation(&mut self, persona_id: &PersonaId) -> bool {
        let Some(conversation) = self.conversations.get_mut(persona_id) else {
            return false;
        };
        for message in conversation.iter() {
            self.index.remove(&message.id);
        }
        *conversation = Arc::new(Vec::new());
        true
    }

    /// Insert or replace a message by id. Used for log replay.
    ///
    /// Replaying the same message twice leaves a single copy.
    pub fn upsert(&mut self, persona_id: &PersonaId, message: Message) {
        if let Some(existing) = self.message_mut(persona_id, message.id) {
            *existing = message;
        } else if !self.index.contains_key(&message.id) {
            self.push(persona_id, message);
        }
    }

    /// Which persona owns `message_id`.
    pub fn persona_of(&self, message_id: MessageId) -> Option<&PersonaId> {
        self.index.get(&message_id).map(|(persona_id, _)| persona_id)
    }

    /// Look up any message by id.
    pub fn find(&self, message_id: MessageId) -> Option<&Message> {
        let (persona_id, pos) = self.index.get(&message_id)?;
        self.conversations.get(persona_id)?.get(*pos)
    }

    /// The message `message_id` replies to, if the link still resolves.
    pub fn reply_target(&self, message_id: MessageId) -> Option<&Message> {
        let reply_to = self.find(message_id)?.reply_to?;
        self.find(reply_to)
    }

    pub fn conversation(&self, persona_id: &PersonaId) -> Option<ConversationSnapshot> {
        self.conversations.get(persona_id).cloned()
    }

    /// Cheap snapshot of every conversation (shares the message vectors).
    pub fn snapshot(&self) -> HashMap<PersonaId, ConversationSnapshot> {
        self.conversations.clone()
    }

    /// Messages across every conversation.
    pub fn message_count(&self) -> usize {
        self.index.len()
    }

    fn push(&mut self, persona_id: &PersonaId, message: Message) {
        let conversation = self.conversations.entry(persona_id.clone()).or_default();
        let vec = Arc::make_mut(conversation);
        self.index
            .insert(message.id, (persona_id.clone(), vec.len()));
        vec.push(message);
    }

    /// Mutable access to a message, checked against its owning persona.
    fn message_mut(&mut self, persona_id: &PersonaId, message_id: MessageId) -> Option<&mut Message> {
        let (owner, pos) = self.index.get(&message_id)?;
        if owner != persona_id {
            return None;
        }
        let pos = *pos;
        let conversation = self.conversations.get_mut(persona_id)?;
        Arc::make_mut(conversation).get_mut(pos)
    }
}

/// Keep at most `max_chars` characters of `text`.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
