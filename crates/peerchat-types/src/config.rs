//! Session configuration types for peerchat.
//!
//! `SessionConfig` represents the `config.toml` in the data directory. It
//! controls free-tier limits and the timings of the simulated counterpart.
//! Every field has a default, so an empty file is a valid config.

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Top-level configuration for a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum characters of outgoing text for free accounts.
    #[serde(default = "default_free_text_limit")]
    pub free_text_limit: usize,

    /// Images a free account may send per session.
    #[serde(default = "default_free_image_quota")]
    pub free_image_quota: u32,

    /// Voice messages a free account may send per session.
    #[serde(default = "default_free_voice_quota")]
    pub free_voice_quota: u32,

    /// Visible characters in a notification preview.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Capacity of the session event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default)]
    pub timing: ReplyTiming,
}

fn default_free_text_limit() -> usize {
    150
}

fn default_free_image_quota() -> u32 {
    3
}

fn default_free_voice_quota() -> u32 {
    3
}

fn default_preview_chars() -> usize {
    crate::notification::DEFAULT_PREVIEW_CHARS
}

fn default_event_capacity() -> usize {
    256
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            free_text_limit: default_free_text_limit(),
            free_image_quota: default_free_image_quota(),
            free_voice_quota: default_free_voice_quota(),
            preview_chars: default_preview_chars(),
            event_capacity: default_event_capacity(),
            timing: ReplyTiming::default(),
        }
    }
}

/// Delays of the simulated counterpart, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTiming {
    /// Delay before a VIP message shows as sent.
    #[serde(default = "default_sent_ms")]
    pub sent_ms: u64,
    /// Lower bound of the delivered delay window.
    #[serde(default = "default_delivered_min_ms")]
    pub delivered_min_ms: u64,
    /// Upper bound (inclusive) of the delivered delay window.
    #[serde(default = "default_delivered_max_ms")]
    pub delivered_max_ms: u64,
    /// Delay between a send and the scripted reply.
    #[serde(default = "default_reply_ms")]
    pub reply_ms: u64,
}

fn default_sent_ms() -> u64 {
    500
}

fn default_delivered_min_ms() -> u64 {
    1_000
}

fn default_delivered_max_ms() -> u64 {
    1_500
}

fn default_reply_ms() -> u64 {
    3_000
}

impl Default for ReplyTiming {
    fn default() -> Self {
        Self {
            sent_ms: default_sent_ms(),
            delivered_min_ms: default_delivered_min_ms(),
            delivered_max_ms: default_delivered_max_ms(),
            reply_ms: default_reply_ms(),
        }
    }
}

impl ReplyTiming {
    pub fn sent_delay(&self) -> Duration {
        Duration::from_millis(self.sent_ms)
    }

    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_ms)
    }

    /// Delivered window as an ordered `(min, max)` pair, tolerating a
    /// config that lists the bounds backwards.
    pub fn delivered_window(&self) -> (u64, u64) {
        if self.delivered_min_ms <= self.delivered_max_ms {
            (self.delivered_min_ms, self.delivered_max_ms)
        } else {
            (self.delivered_max_ms, self.delivered_min_ms)
        }
    }
}
