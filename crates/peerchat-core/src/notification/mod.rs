//! Notification routing (inbox + history).

pub mod router;

pub use router::{NotificationRouter, display_title};
