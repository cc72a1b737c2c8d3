//! Caregiver-side view of the incident store.
//!
//! The monitor polls the store and turns record changes into discrete
//! changes: an alarm on the `detected` false→true edge, a stop when it goes
//! back to false, camera online/offline from the live frame's heartbeat, and
//! history refreshes.

use anyhow::Result;

use crate::config::MonitorSettings;
use crate::store::{HistoryItem, IncidentStore};

/// Alarm delivery (sound, push, vibration) behind a narrow seam.
pub trait Alarm {
    fn trigger(&mut self, message: &str);
    fn stop(&mut self);
}

/// Alarm that only writes log lines.
#[derive(Debug, Default)]
pub struct LogAlarm {
    ringing: bool,
}

impl LogAlarm {
    pub fn is_ringing(&self) -> bool {
        self.ringing
    }
}

impl Alarm for LogAlarm {
    fn trigger(&mut self, message: &str) {
        self.ringing = true;
        log::warn!("ALARM: {}", message);
    }

    fn stop(&mut self) {
        if self.ringing {
            log::info!("alarm stopped");
        }
        self.ringing = false;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorChange {
    AlarmRaised { timestamp_ms: Option<u64> },
    AlarmStopped,
    CameraOnline,
    CameraOffline { last_active_ms: Option<u64> },
    HistoryUpdated { entries: usize },
}

pub struct Monitor<A: Alarm> {
    settings: MonitorSettings,
    alarm: A,
    detected: bool,
    online: Option<bool>,
    last_offline_check_ms: Option<u64>,
    history: Vec<HistoryItem>,
}

impl<A: Alarm> Monitor<A> {
    pub fn new(settings: MonitorSettings, alarm: A) -> Self {
        Self {
            settings,
            alarm,
            detected: false,
            online: None,
            last_offline_check_ms: None,
            history: Vec::new(),
        }
    }

    /// Read the store once and report what changed since the last poll.
    pub fn poll(&mut self, store: &dyn IncidentStore, now_ms: u64) -> Result<Vec<MonitorChange>> {
        let mut changes = Vec::new();

        let event = store.fall_event()?.unwrap_or_default();
        if event.detected && !self.detected {
            self.alarm.trigger("fall detected");
            changes.push(MonitorChange::AlarmRaised {
                timestamp_ms: event.timestamp_ms,
            });
        } else if !event.detected && self.detected {
            self.alarm.stop();
            changes.push(MonitorChange::AlarmStopped);
        }
        self.detected = event.detected;

        if self.offline_check_due(now_ms) {
            self.last_offline_check_ms = Some(now_ms);
            let last_active = store.live_frame()?.map(|frame| frame.last_active_ms);
            let online = match last_active {
                Some(at) => {
                    now_ms.saturating_sub(at) <= duration_ms(self.settings.offline_after)
                }
                None => false,
            };
            if self.online != Some(online) {
                let change = if online {
                    MonitorChange::CameraOnline
                } else {
                    MonitorChange::CameraOffline {
                        last_active_ms: last_active,
                    }
                };
                if !online {
                    log::warn!("camera offline (last active {:?})", last_active);
                }
                changes.push(change);
                self.online = Some(online);
            }
        }

        let history = store.recent_history(self.settings.history_limit)?;
        if history != self.history {
            changes.push(MonitorChange::HistoryUpdated {
                entries: history.len(),
            });
            self.history = history;
        }

        Ok(changes)
    }

    /// Mark the current incident handled. The alarm stops on the next poll.
    pub fn resolve(&mut self, store: &mut dyn IncidentStore) -> Result<()> {
        store.resolve()?;
        log::info!("incident resolved");
        Ok(())
    }

    pub fn delete_history(&mut self, store: &mut dyn IncidentStore, id: &str) -> Result<bool> {
        let removed = store.delete_history(id)?;
        if removed {
            self.history.retain(|item| item.id != id);
        }
        Ok(removed)
    }

    pub fn history(&self) -> &[HistoryItem] {
        &self.history
    }

    pub fn is_alarming(&self) -> bool {
        self.detected
    }

    /// `None` until the first offline check has run.
    pub fn camera_online(&self) -> Option<bool> {
        self.online
    }

    pub fn alarm(&self) -> &A {
        &self.alarm
    }

    fn offline_check_due(&self, now_ms: u64) -> bool {
        match self.last_offline_check_ms {
            Some(last) => now_ms.saturating_sub(last) >= duration_ms(self.settings.offline_check),
            None => true,
        }
    }
}

fn duration_ms(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
