use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receiver of confirmed detections.
///
/// `fire` carries no payload and is called at most once per episode under the
/// default refire policy. Notification, persistence and UI live behind it.
pub trait EventSink {
    fn fire(&mut self);
}

impl<F: FnMut()> EventSink for F {
    fn fire(&mut self) {
        self()
    }
}

/// Sink that counts events so a host loop can pick them up after a tick.
#[derive(Clone, Debug, Default)]
pub struct EventCounter {
    pending: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events raised since the last call.
    pub fn take(&self) -> u64 {
        self.pending.swap(0, Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }
}

impl EventSink for EventCounter {
    fn fire(&mut self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_take_resets_pending_only() {
        let counter = EventCounter::new();
        let mut sink = counter.clone();
        sink.fire();
        sink.fire();
        assert_eq!(counter.take(), 2);
        assert_eq!(counter.take(), 0);
        assert_eq!(counter.total(), 2);
    }

    #[test]
    fn closures_are_sinks() {
        let mut hits = 0;
        {
            let mut sink = || hits += 1;
            EventSink::fire(&mut sink);
            EventSink::fire(&mut sink);
        }
        assert_eq!(hits, 2);
    }
}
