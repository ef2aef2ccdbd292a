//! Account tier, feature gates, and media quotas.
//!
//! Every VIP-only operation consults [`Entitlements::allows`] so gating stays
//! consistent across call sites.

use serde::{Deserialize, Serialize};

use std::fmt;

/// Features gated behind the VIP tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Reactions,
    Replies,
    Translation,
    Unsend,
    /// Sent/delivered/read transitions on outgoing messages.
    ReadReceipts,
    /// No cap on image and voice messages.
    UnlimitedMedia,
    /// No truncation of outgoing text.
    LongText,
}

/// What the current account may do, as reported by the account subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlements {
    pub vip: bool,
    /// Images a free account may send per session.
    pub image_quota: u32,
    /// Voice messages a free account may send per session.
    pub voice_quota: u32,
}

impl Entitlements {
    pub fn free(image_quota: u32, voice_quota: u32) -> Self {
        Self {
            vip: false,
            image_quota,
            voice_quota,
        }
    }

    pub fn vip() -> Self {
        Self {
            vip: true,
            image_quota: 0,
            voice_quota: 0,
        }
    }

    /// The single capability check for gated features.
    pub fn allows(&self, feature: Feature) -> bool {
        match feature {
            Feature::Reactions
            | Feature::Replies
            | Feature::Translation
            | Feature::Unsend
            | Feature::ReadReceipts
            | Feature::UnlimitedMedia
            | Feature::LongText => self.vip,
        }
    }

    pub fn image_allowance(&self) -> Quota {
        if self.allows(Feature::UnlimitedMedia) {
            Quota::Unlimited
        } else {
            Quota::Remaining(self.image_quota)
        }
    }

    pub fn voice_allowance(&self) -> Quota {
        if self.allows(Feature::UnlimitedMedia) {
            Quota::Unlimited
        } else {
            Quota::Remaining(self.voice_quota)
        }
    }
}

/// A per-session media counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "remaining", rename_all = "snake_case")]
pub enum Quota {
    Unlimited,
    Remaining(u32),
}

impl Quota {
    /// Consume one unit. Returns `false` when the quota is exhausted.
    pub fn try_consume(&mut self) -> bool {
        match self {
            Quota::Unlimited => true,
            Quota::Remaining(0) => false,
            Quota::Remaining(n) => {
                *n -= 1;
                true
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Quota::Remaining(0))
    }

    /// What is left of this allowance once `used` units have gone.
    pub fn less(self, used: u32) -> Quota {
        match self {
            Quota::Unlimited => Quota::Unlimited,
            Quota::Remaining(n) => Quota::Remaining(n.saturating_sub(used)),
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quota::Unlimited => write!(f, "unlimited"),
            Quota::Remaining(n) => write!(f, "{n}"),
        }
    }
}
