//! Event types for the peerchat session event bus.
//!
//! `SessionEvent` is broadcast after every state change so observers can
//! re-render from a fresh snapshot. All variants are Clone + Send + Sync for
//! use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

use crate::message::{DeliveryStatus, MessageId};
use crate::notification::NotificationId;
use crate::persona::PersonaId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A message was appended to a conversation.
    MessageAppended {
        persona_id: PersonaId,
        message_id: MessageId,
    },

    /// A message's reactions, reply link, translation, or tombstone changed.
    MessageUpdated {
        persona_id: PersonaId,
        message_id: MessageId,
    },

    /// A user message moved forward in its delivery lifecycle.
    StatusAdvanced {
        persona_id: PersonaId,
        message_id: MessageId,
        status: DeliveryStatus,
    },

    /// The typing indicator of a persona flipped.
    TypingChanged { persona_id: PersonaId, typing: bool },

    /// An unread notification landed in the inbox.
    InboxNotification {
        notification_id: NotificationId,
        persona_id: Option<PersonaId>,
    },

    /// An outgoing action was recorded in the history log.
    HistoryNotification { notification_id: NotificationId },

    /// Inbox read state changed (one or many entries).
    NotificationsAcknowledged { unread: usize },

    /// The focused conversation changed; `None` means the empty state.
    FocusChanged { persona_id: Option<PersonaId> },

    /// A conversation was cleared.
    ConversationDeleted { persona_id: PersonaId },

    /// A persona was blocked or unblocked.
    BlockChanged { persona_id: PersonaId, blocked: bool },

    /// Search term or structured filters changed.
    FiltersChanged,

    /// Account tier or quotas changed.
    EntitlementsChanged { vip: bool },
}
