//! Bot response simulator.
//!
//! Every send starts a short, fixed script of timers that fake a live
//! counterpart:
//!
//! - +`sent_ms` (read receipts only): the message advances to `Sent`
//! - +random `delivered_min_ms..=delivered_max_ms` (read receipts only):
//!   the message advances to `Delivered`
//! - +`reply_ms`: the persona stops typing and its scripted reply lands
//!
//! Timers run as tasks on a `TaskTracker` owned by the session, not by any
//! view, and cannot be cancelled once started. Each task holds only a `Weak`
//! handle to its sink, so a dropped session turns pending callbacks into
//! no-ops. Callbacks may fire late or out of order; the sink relies on
//! monotonic status transitions to stay consistent.

use std::sync::Weak;
use std::time::Duration;

use peerchat_types::config::ReplyTiming;
use peerchat_types::message::{DeliveryStatus, MessageId};
use peerchat_types::persona::PersonaId;
use rand::Rng;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// One simulated exchange, captured when the user message is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPlan {
    pub persona_id: PersonaId,
    /// The user message that triggered the simulation.
    pub message_id: MessageId,
    /// Whether sent/delivered/read transitions are simulated.
    pub read_receipts: bool,
    /// Notification generation of the persona at send time.
    pub generation: u64,
}

/// Receiver of simulator callbacks (the session state owner).
pub trait ReplySink: Send + Sync + 'static {
    /// Advance a user message's status; must ignore non-advancing updates.
    fn advance_status(
        &self,
        persona_id: &PersonaId,
        message_id: MessageId,
        status: DeliveryStatus,
    ) -> impl std::future::Future<Output = ()> + Send;

    /// Stop typing and deliver the scripted reply for `plan`.
    fn deliver_reply(&self, plan: &ReplyPlan) -> impl std::future::Future<Output = ()> + Send;
}

/// Schedules the timer script for each send.
#[derive(Debug, Clone)]
pub struct ReplySimulator {
    timing: ReplyTiming,
    tracker: TaskTracker,
}

impl ReplySimulator {
    pub fn new(timing: ReplyTiming) -> Self {
        Self {
            timing,
            tracker: TaskTracker::new(),
        }
    }

    /// Start the script for `plan`. Must be called inside a tokio runtime.
    pub fn start<S: ReplySink>(&self, sink: Weak<S>, plan: ReplyPlan) {
        if plan.read_receipts {
            let (min, max) = self.timing.delivered_window();
            let delivered_ms = rand::thread_rng().gen_range(min..=max);
            self.schedule_status(
                sink.clone(),
                &plan,
                self.timing.sent_delay(),
                DeliveryStatus::Sent,
            );
            self.schedule_status(
                sink.clone(),
                &plan,
                Duration::from_millis(delivered_ms),
                DeliveryStatus::Delivered,
            );
        }

        let delay = self.timing.reply_delay();
        debug!(persona_id = %plan.persona_id, message_id = %plan.message_id, ?delay, "scheduled reply");
        self.tracker.spawn(async move {
            tokio::time::sleep(delay).await;
            match sink.upgrade() {
                Some(sink) => sink.deliver_reply(&plan).await,
                None => debug!(persona_id = %plan.persona_id, "session gone, reply dropped"),
            }
        });
    }

    fn schedule_status<S: ReplySink>(
        &self,
        sink: Weak<S>,
        plan: &ReplyPlan,
        delay: Duration,
        status: DeliveryStatus,
    ) {
        let persona_id = plan.persona_id.clone();
        let message_id = plan.message_id;
        self.tracker.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(sink) = sink.upgrade() {
                sink.advance_status(&persona_id, message_id, status).await;
            }
        });
    }

    /// Number of timer tasks still pending.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every timer scheduled so far has fired.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Status(DeliveryStatus, u64),
        Reply(u64),
    }

    struct RecordingSink {
        started: Instant,
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: Instant::now(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn elapsed_ms(&self) -> u64 {
            self.started.elapsed().as_millis() as u64
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ReplySink for RecordingSink {
        async fn advance_status(&self, _: &PersonaId, _: MessageId, status: DeliveryStatus) {
            let at = self.elapsed_ms();
            self.calls.lock().unwrap().push(Call::Status(status, at));
        }

        async fn deliver_reply(&self, _: &ReplyPlan) {
            let at = self.elapsed_ms();
            self.calls.lock().unwrap().push(Call::Reply(at));
        }
    }

    /// Paused-clock timers fire on millisecond ticks; allow one tick of slack.
    fn assert_near(actual: u64, expected: u64) {
        assert!(
            actual >= expected && actual <= expected + 1,
            "fired at {actual}ms, expected {expected}ms"
        );
    }

    fn plan(read_receipts: bool) -> ReplyPlan {
        ReplyPlan {
            persona_id: "p1".into(),
            message_id: MessageId::new(),
            read_receipts,
            generation: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn read_receipt_script_fires_in_order() {
        let sim = ReplySimulator::new(ReplyTiming::default());
        let sink = RecordingSink::new();

        sim.start(Arc::downgrade(&sink), plan(true));
        assert_eq!(sim.pending(), 3);
        sim.wait_idle().await;

        let calls = sink.calls();
        assert_eq!(calls.len(), 3);
        match calls[0] {
            Call::Status(DeliveryStatus::Sent, at) => assert_near(at, 500),
            ref other => panic!("unexpected call {other:?}"),
        }
        match calls[1] {
            Call::Status(DeliveryStatus::Delivered, at) => assert!((1_000..=1_501).contains(&at)),
            ref other => panic!("unexpected call {other:?}"),
        }
        match calls[2] {
            Call::Reply(at) => assert_near(at, 3_000),
            ref other => panic!("unexpected call {other:?}"),
        }
        assert_eq!(sim.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn without_read_receipts_only_reply_fires() {
        let sim = ReplySimulator::new(ReplyTiming::default());
        let sink = RecordingSink::new();

        sim.start(Arc::downgrade(&sink), plan(false));
        assert_eq!(sim.pending(), 1);
        sim.wait_idle().await;

        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], Call::Reply(at) if (3_000..=3_001).contains(&at)));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sink_turns_callbacks_into_noops() {
        let sim = ReplySimulator::new(ReplyTiming::default());
        let sink = RecordingSink::new();
        let weak = Arc::downgrade(&sink);

        sim.start(weak.clone(), plan(true));
        drop(sink);
        sim.wait_idle().await;

        assert!(weak.upgrade().is_none());
        assert_eq!(sim.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_idle_allows_further_scheduling() {
        let sim = ReplySimulator::new(ReplyTiming {
            reply_ms: 10,
            ..ReplyTiming::default()
        });
        let sink = RecordingSink::new();

        sim.start(Arc::downgrade(&sink), plan(false));
        sim.wait_idle().await;
        sim.start(Arc::downgrade(&sink), plan(false));
        sim.wait_idle().await;

        let calls = sink.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::Reply(at) if (10..=11).contains(&at)));
        assert!(matches!(calls[1], Call::Reply(at) if (20..=22).contains(&at)));
    }
}
