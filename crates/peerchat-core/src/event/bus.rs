//! Session change notifications.
//!
//! Observers (renderers, tests, the CLI event printer) subscribe to a
//! `tokio::sync::broadcast` channel. Each mutation publishes its events as
//! one batch, in the order they were produced, after the state lock is
//! released. A slow observer may lag and miss events; it should resync from
//! `Session::snapshot` rather than expect a complete history.

use peerchat_types::event::SessionEvent;
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// `capacity` is the number of events a subscriber may fall behind
    /// before it starts lagging. Zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish a batch in order. Returns how many observers were listening;
    /// with none, the batch is dropped.
    pub fn publish_all(&self, events: impl IntoIterator<Item = SessionEvent>) -> usize {
        let observers = self.sender.receiver_count();
        if observers == 0 {
            return 0;
        }
        for event in events {
            trace!(?event, "publishing session event");
            let _ = self.sender.send(event);
        }
        observers
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn typing(persona: &str, typing: bool) -> SessionEvent {
        SessionEvent::TypingChanged {
            persona_id: persona.into(),
            typing,
        }
    }

    #[test]
    fn test_batch_arrives_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let delivered_to = bus.publish_all([typing("p1", true), SessionEvent::FiltersChanged, typing("p1", false)]);
        assert_eq!(delivered_to, 1);

        assert_eq!(rx.try_recv().unwrap(), typing("p1", true));
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::FiltersChanged);
        assert_eq!(rx.try_recv().unwrap(), typing("p1", false));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_no_observers_drops_events() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish_all([SessionEvent::FiltersChanged]), 0);

        // Subscribers only see events published after they joined.
        let mut rx = bus.subscribe();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_every_observer_gets_a_copy() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.clone().subscribe();

        assert_eq!(bus.publish_all([typing("p2", true)]), 2);
        assert_eq!(a.recv().await.unwrap(), typing("p2", true));
        assert_eq!(b.recv().await.unwrap(), typing("p2", true));
    }

    #[tokio::test]
    async fn test_lagging_observer_skips_to_newest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish_all([typing(&format!("p{i}"), true)]);
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(rx.recv().await.unwrap(), typing("p3", true));
        assert_eq!(rx.recv().await.unwrap(), typing("p4", true));
    }

    #[test]
    fn test_zero_capacity_is_usable() {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.publish_all([SessionEvent::FiltersChanged]);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::FiltersChanged);
    }
}
