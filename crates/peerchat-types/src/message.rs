//! Conversation message types for peerchat.
//!
//! A `Message` is one entry of a persona conversation: user-authored text or
//! media, a scripted bot reply, or a system greeting. Delivery status,
//! reactions, translations and the unsend tombstone all live on the message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Placeholder rendered in place of an unsent message.
pub const UNSENT_PLACEHOLDER: &str = "This message was unsent.";

/// Unique message identifier, wrapping a UUID v7 (timestamp + random bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Create a new time-sortable message id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
    System,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Bot => write!(f, "bot"),
            Sender::System => write!(f, "system"),
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Sender::User),
            "bot" => Ok(Sender::Bot),
            "system" => Ok(Sender::System),
            other => Err(format!("invalid sender: '{other}'")),
        }
    }
}

/// Delivery status of a user message.
///
/// Variants are declared in lifecycle order so the derived `Ord` gives
/// `Sending < Sent < Delivered < Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Read,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Sending => write!(f, "sending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Delivered => write!(f, "delivered"),
            DeliveryStatus::Read => write!(f, "read"),
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sending" => Ok(DeliveryStatus::Sending),
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "read" => Ok(DeliveryStatus::Read),
            other => Err(format!("invalid delivery status: '{other}'")),
        }
    }
}

/// Payload kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    /// `content` holds an opaque image reference.
    Image,
    /// `content` holds an opaque audio reference.
    Voice { duration_secs: u32 },
}

impl MessageKind {
    pub fn is_text(&self) -> bool {
        matches!(self, MessageKind::Text)
    }

    pub fn is_image(&self) -> bool {
        matches!(self, MessageKind::Image)
    }

    pub fn is_voice(&self) -> bool {
        matches!(self, MessageKind::Voice { .. })
    }
}

/// One emoji reaction by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub user_id: String,
}

/// A translated rendering of a text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub language: String,
    pub content: String,
}

/// A single message within a persona conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    /// Only meaningful for `Sender::User` messages.
    pub status: DeliveryStatus,
    pub kind: MessageKind,
    /// Unsend tombstone. Content is retained.
    #[serde(default)]
    pub is_deleted: bool,
    /// Weak reference to another message; may dangle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// At most one entry: setting a translation replaces the previous one.
    #[serde(default)]
    pub translations: Vec<Translation>,
}

impl Message {
    fn new(sender: Sender, content: String, kind: MessageKind, status: DeliveryStatus) -> Self {
        Self {
            id: MessageId::new(),
            content,
            sender,
            timestamp: Utc::now(),
            status,
            kind,
            is_deleted: false,
            reply_to: None,
            reactions: Vec::new(),
            translations: Vec::new(),
        }
    }

    /// A freshly composed user message, still `Sending`.
    pub fn user(content: impl Into<String>, kind: MessageKind) -> Self {
        Self::new(Sender::User, content.into(), kind, DeliveryStatus::Sending)
    }

    /// A scripted reply from a persona.
    pub fn bot(content: impl Into<String>) -> Self {
        Self::new(Sender::Bot, content.into(), MessageKind::Text, DeliveryStatus::Read)
    }

    /// A system notice such as the conversation greeting.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Sender::System, content.into(), MessageKind::Text, DeliveryStatus::Read)
    }

    /// Move the status forward to `next`.
    ///
    /// Returns `false` (and changes nothing) when `next` is not strictly ahead
    /// of the current status.
    pub fn advance_status(&mut self, next: DeliveryStatus) -> bool {
        if next > self.status {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Add the `(emoji, user_id)` pair, or remove it if already present.
    ///
    /// Returns `true` when the reaction was added.
    pub fn toggle_reaction(&mut self, emoji: &str, user_id: &str) -> bool {
        if let Some(pos) = self
            .reactions
            .iter()
            .position(|r| r.emoji == emoji && r.user_id == user_id)
        {
            self.reactions.remove(pos);
            false
        } else {
            self.reactions.push(Reaction {
                emoji: emoji.to_string(),
                user_id: user_id.to_string(),
            });
            true
        }
    }

    /// Replace the translation slot.
    pub fn set_translation(&mut self, language: impl Into<String>, content: impl Into<String>) {
        self.translations.clear();
        self.translations.push(Translation {
            language: language.into(),
            content: content.into(),
        });
    }

    /// The current translation, if any.
    pub fn translation(&self) -> Option<&Translation> {
        self.translations.first()
    }

    /// Text to render for this message.
    ///
    /// Tombstoned messages render as [`UNSENT_PLACEHOLDER`]; media renders as
    /// a short placeholder instead of the opaque payload reference.
    pub fn display_content(&self) -> String {
        if self.is_deleted {
            return UNSENT_PLACEHOLDER.to_string();
        }
        match self.kind {
            MessageKind::Text => self.content.clone(),
            MessageKind::Image => "[Image]".to_string(),
            MessageKind::Voice { duration_secs } => {
                format!("[Voice message {}:{:02}]", duration_secs / 60, duration_secs % 60)
            }
        }
    }
}
