//! Inbox and history notification logs.
//!
//! The inbox holds unread-capable notifications for incoming messages from
//! conversations the visitor is not looking at. The history is an
//! always-read record of the visitor's own outgoing actions. Both logs are
//! newest-first.

use std::collections::VecDeque;

use peerchat_types::notification::{Notification, NotificationId};
use peerchat_types::persona::PersonaId;

use crate::roster::Roster;

#[derive(Debug, Clone, Default)]
pub struct NotificationRouter {
    inbox: VecDeque<Notification>,
    history: VecDeque<Notification>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend an incoming notification to the inbox.
    pub fn push_inbox(&mut self, notification: Notification) -> NotificationId {
        let id = notification.id;
        self.inbox.push_front(notification);
        id
    }

    /// Prepend an outgoing notification to the history, forcing it read.
    pub fn push_history(&mut self, mut notification: Notification) -> NotificationId {
        notification.read = true;
        let id = notification.id;
        self.history.push_front(notification);
        id
    }

    /// Mark one inbox entry read.
    ///
    /// Returns `true` only if an unread entry flipped; unknown ids and
    /// already-read entries are no-ops.
    pub fn acknowledge(&mut self, id: NotificationId) -> bool {
        match self.inbox.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                true
            }
            _ => false,
        }
    }

    /// Mark every inbox entry read. Returns how many flipped.
    pub fn acknowledge_all(&mut self) -> usize {
        let mut flipped = 0;
        for n in self.inbox.iter_mut().filter(|n| !n.read) {
            n.read = true;
            flipped += 1;
        }
        flipped
    }

    /// Mark every inbox entry of one persona read. Returns how many flipped.
    pub fn acknowledge_persona(&mut self, persona_id: &PersonaId) -> usize {
        let mut flipped = 0;
        for n in self
            .inbox
            .iter_mut()
            .filter(|n| !n.read && n.bot_id.as_ref() == Some(persona_id))
        {
            n.read = true;
            flipped += 1;
        }
        flipped
    }

    /// Number of unread inbox entries, computed on every call.
    pub fn unread_count(&self) -> usize {
        self.inbox.iter().filter(|n| !n.read).count()
    }

    pub fn find_inbox(&self, id: NotificationId) -> Option<&Notification> {
        self.inbox.iter().find(|n| n.id == id)
    }

    pub fn inbox(&self) -> Vec<Notification> {
        self.inbox.iter().cloned().collect()
    }

    pub fn history(&self) -> Vec<Notification> {
        self.history.iter().cloned().collect()
    }
}

/// Title to render for `notification`, re-resolved from the current roster.
///
/// Persona display data may change after a notification was created, so a
/// notification that references a known persona is titled from the roster;
/// anything else falls back to the stored title.
pub fn display_title(notification: &Notification, roster: &Roster) -> String {
    notification
        .bot_id
        .as_ref()
        .and_then(|id| roster.get(id))
        .map(|p| format!("New message from {}", p.name))
        .unwrap_or_else(|| notification.title.clone())
}
