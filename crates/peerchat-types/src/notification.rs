//! Notification entries for the inbox and history logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

use crate::persona::PersonaId;

/// Default number of visible characters in a notification preview.
pub const DEFAULT_PREVIEW_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub Uuid);

impl NotificationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inbox or history entry.
///
/// `title` is captured at creation time. For inbox entries the presentation
/// layer should prefer re-resolving the persona name through `bot_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    /// Truncated preview of the message body.
    pub message: String,
    pub time: DateTime<Utc>,
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<PersonaId>,
}

impl Notification {
    /// An unread notification for an incoming message.
    pub fn incoming(
        title: impl Into<String>,
        body: &str,
        bot_id: PersonaId,
        preview_chars: usize,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            title: title.into(),
            message: preview(body, preview_chars),
            time: Utc::now(),
            read: false,
            bot_id: Some(bot_id),
        }
    }

    /// A pre-read record of an outgoing action.
    pub fn outgoing(
        title: impl Into<String>,
        body: &str,
        bot_id: Option<PersonaId>,
        preview_chars: usize,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            title: title.into(),
            message: preview(body, preview_chars),
            time: Utc::now(),
            read: true,
            bot_id,
        }
    }
}

/// Truncate `text` to `max_chars` visible characters, appending `...` when cut.
///
/// Counts `char`s, not bytes, so multi-byte text is never split mid-character.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
