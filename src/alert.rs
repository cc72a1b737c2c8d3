//! Camera-side handling of confirmed detections.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::frame::Frame;
use crate::store::{FallEvent, HistoryItem, IncidentStore};

/// Holds the camera in the "alerting" state for a fixed window after an
/// event. Events inside the window are ignored.
#[derive(Debug, Clone)]
pub struct AlertLatch {
    hold: Duration,
    raised_at: Option<Instant>,
}

impl AlertLatch {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            raised_at: None,
        }
    }

    /// Returns true if the event is accepted (the latch was not already held).
    pub fn try_raise(&mut self, now: Instant) -> bool {
        if self.is_alerting(now) {
            return false;
        }
        self.raised_at = Some(now);
        true
    }

    pub fn is_alerting(&self, now: Instant) -> bool {
        match self.raised_at {
            Some(at) => now.saturating_duration_since(at) < self.hold,
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.raised_at = None;
    }
}

/// Write an accepted event: current fall status plus a history entry, both
/// carrying the same evidence snapshot.
pub fn record_fall(
    store: &mut dyn IncidentStore,
    frame: Option<&Frame>,
    evidence_quality: u8,
    now_ms: u64,
) -> Result<HistoryItem> {
    let evidence = match frame {
        Some(frame) => Some(frame.encode_jpeg(evidence_quality)?),
        None => None,
    };
    store.put_fall_event(&FallEvent::raised(evidence.clone(), now_ms))?;
    let item = HistoryItem::new(evidence, now_ms);
    store.append_history(&item)?;
    Ok(item)
}
