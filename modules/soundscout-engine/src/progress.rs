//! Per-session fan-out channel for progress events.
//!
//! Publishers never block: each subscriber gets a bounded buffer, and a
//! subscriber that falls behind is cut loose — it drains what it already has,
//! then receives a final `Lagged(n)` accounting for everything it missed.
//! There is no backlog replay for late subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use soundscout_common::events::ProgressEvent;

pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

struct Subscriber {
    tx: Option<mpsc::Sender<ProgressEvent>>,
    missed: Arc<AtomicU64>,
}

struct BusState {
    subscribers: Vec<Subscriber>,
    closed: bool,
}

pub struct ProgressBus {
    buffer: usize,
    state: Mutex<BusState>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            state: Mutex::new(BusState {
                subscribers: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Subscribe to events published after this call. Subscribing to a closed
    /// bus yields an immediately-ended stream.
    pub fn subscribe(&self) -> ProgressReceiver {
        let (tx, rx) = mpsc::channel(self.buffer);
        let missed = Arc::new(AtomicU64::new(0));
        let mut state = self.state.lock().expect("bus mutex poisoned");
        if !state.closed {
            state.subscribers.push(Subscriber {
                tx: Some(tx),
                missed: Arc::clone(&missed),
            });
        }
        ProgressReceiver {
            rx,
            missed,
            lagged_emitted: false,
        }
    }

    /// Publish without blocking. A subscriber whose buffer is full is dropped
    /// and starts accumulating its missed-event count.
    pub fn publish(&self, event: ProgressEvent) {
        let mut state = self.state.lock().expect("bus mutex poisoned");
        if state.closed {
            return;
        }
        Self::fan_out(&mut state.subscribers, &event);
    }

    /// Publish a terminal event and close the bus. The event is placed in
    /// every live subscriber's buffer before the channels are closed, so
    /// subscribers always observe it unless they were already lagging.
    pub fn publish_terminal(&self, event: ProgressEvent) {
        debug_assert!(event.is_terminal());
        let mut state = self.state.lock().expect("bus mutex poisoned");
        if state.closed {
            return;
        }
        Self::fan_out(&mut state.subscribers, &event);
        state.closed = true;
        // Dropping the senders ends every stream once buffers drain.
        state.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("bus mutex poisoned").closed
    }

    fn fan_out(subscribers: &mut [Subscriber], event: &ProgressEvent) {
        for sub in subscribers.iter_mut() {
            let Some(tx) = sub.tx.take() else {
                sub.missed.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            match tx.try_send(event.clone()) {
                Ok(()) => sub.tx = Some(tx),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Dropping lagging progress subscriber");
                    sub.missed.fetch_add(1, Ordering::Relaxed);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a subscription.
pub struct ProgressReceiver {
    rx: mpsc::Receiver<ProgressEvent>,
    missed: Arc<AtomicU64>,
    lagged_emitted: bool,
}

impl ProgressReceiver {
    /// Next event, or None when the stream has ended. A subscriber that was
    /// dropped for lagging receives one final `Lagged(n)` before the end.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        if let Some(event) = self.rx.recv().await {
            return Some(event);
        }
        let missed = self.missed.load(Ordering::Relaxed);
        if missed > 0 && !self.lagged_emitted {
            self.lagged_emitted = true;
            return Some(ProgressEvent::Lagged { missed });
        }
        None
    }

    /// Drain everything currently pending plus the stream end, collecting
    /// into a Vec. Test/CLI convenience.
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soundscout_common::error::ErrorKind;
    use soundscout_common::events::SessionSummary;
    use soundscout_common::types::SessionCounters;

    fn candidate(n: u64) -> ProgressEvent {
        ProgressEvent::CandidateFound {
            video_id: format!("vid{n:08}"),
            title: format!("Artist {n} - Song (Official Music Video)"),
        }
    }

    fn completed() -> ProgressEvent {
        ProgressEvent::SessionCompleted {
            summary: SessionSummary {
                counters: SessionCounters::default(),
                budget_exhausted: false,
                elapsed_ms: 1,
            },
        }
    }

    #[tokio::test]
    async fn subscriber_sees_events_in_order() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe();
        bus.publish(candidate(1));
        bus.publish(candidate(2));
        bus.publish_terminal(completed());

        assert_eq!(rx.recv().await, Some(candidate(1)));
        assert_eq!(rx.recv().await, Some(candidate(2)));
        assert!(rx.recv().await.unwrap().is_terminal());
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn no_backlog_replay_for_late_subscribers() {
        let bus = ProgressBus::new();
        bus.publish(candidate(1));
        let mut rx = bus.subscribe();
        bus.publish(candidate(2));
        bus.publish_terminal(completed());

        assert_eq!(rx.recv().await, Some(candidate(2)));
        assert!(rx.recv().await.unwrap().is_terminal());
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_with_lagged() {
        let bus = ProgressBus::with_buffer(2);
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        // buffer 2: the third and fourth publishes overflow the slow reader
        for n in 0..4 {
            bus.publish(candidate(n));
        }
        bus.publish_terminal(completed());

        // fast reader has a buffer of 2 as well — it also lags here; use a
        // fresh bus to verify isolation instead.
        let mut seen = Vec::new();
        while let Some(e) = slow.recv().await {
            seen.push(e);
        }
        assert_eq!(seen.len(), 3, "two buffered events plus Lagged: {seen:?}");
        assert!(matches!(seen.last(), Some(ProgressEvent::Lagged { missed }) if *missed >= 1));
        let _ = fast;
    }

    #[tokio::test]
    async fn fast_subscriber_unaffected_by_slow_peer() {
        let bus = ProgressBus::with_buffer(2);
        let mut slow = bus.subscribe();

        bus.publish(candidate(0));
        bus.publish(candidate(1));

        // a subscriber that keeps up sees everything
        let mut fast = bus.subscribe();
        bus.publish(candidate(2)); // slow now overflows and is dropped
        bus.publish(candidate(3));
        bus.publish_terminal(completed());

        let fast_events = fast.collect().await;
        assert_eq!(fast_events.len(), 3, "{fast_events:?}");
        assert!(!fast_events.iter().any(|e| matches!(e, ProgressEvent::Lagged { .. })));

        // slow missed the overflow event, the one after it, and the terminal
        let slow_events = slow.collect().await;
        assert!(matches!(
            slow_events.last(),
            Some(ProgressEvent::Lagged { missed }) if *missed == 3
        ));
    }

    #[tokio::test]
    async fn publish_after_close_is_dropped() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe();
        bus.publish_terminal(completed());
        bus.publish(candidate(9));
        bus.publish_terminal(ProgressEvent::SessionFailed {
            kind: ErrorKind::Fatal,
            message: "late".into(),
            counters: SessionCounters::default(),
        });

        let events = [rx.recv().await, rx.recv().await];
        assert!(events[0].as_ref().unwrap().is_terminal());
        assert!(events[1].is_none());
    }

    #[tokio::test]
    async fn subscribe_after_close_ends_immediately() {
        let bus = ProgressBus::new();
        bus.publish_terminal(completed());
        let mut rx = bus.subscribe();
        assert_eq!(rx.recv().await, None);
    }
}
