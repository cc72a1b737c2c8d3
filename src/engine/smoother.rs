//! Temporal smoothing of per-frame detections.
//!
//! One saturating counter goes up on qualifying frames and down (or to zero)
//! on misses. An event is confirmed when the counter reaches `confirm_frames`
//! on a qualifying frame; the refire policy decides what happens next.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// What a non-qualifying frame does to the counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissPolicy {
    /// Decrement by one, never below zero.
    #[default]
    Decay,
    /// Drop straight to zero.
    Reset,
}

/// When a confirmed detection may fire again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefirePolicy {
    /// Fire once, then stay silent until the counter has returned to zero.
    #[default]
    Cooldown,
    /// Fire, then reset the counter to zero. The next event needs another full
    /// run of `confirm_frames` qualifying frames.
    ResetOnFire,
    /// Fire on every qualifying frame while the counter is at or above
    /// `confirm_frames`.
    Unsuppressed,
}

impl std::str::FromStr for MissPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "decay" => Ok(Self::Decay),
            "reset" => Ok(Self::Reset),
            other => Err(anyhow!("unknown miss policy '{}'; expected decay or reset", other)),
        }
    }
}

impl std::str::FromStr for RefirePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "cooldown" => Ok(Self::Cooldown),
            "reset_on_fire" => Ok(Self::ResetOnFire),
            "unsuppressed" => Ok(Self::Unsuppressed),
            other => Err(anyhow!(
                "unknown refire policy '{}'; expected cooldown, reset_on_fire or unsuppressed",
                other
            )),
        }
    }
}

/// Result of feeding one frame outcome into the smoother.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmoothStep {
    /// Counter after this frame.
    pub count: u32,
    /// The event sink must be invoked for this frame.
    pub fired: bool,
    /// An episode is active after this frame.
    pub episode_active: bool,
    /// The active episode ended on this frame (counter reached zero).
    pub episode_ended: bool,
}

#[derive(Clone, Debug)]
pub struct Smoother {
    count: u32,
    active: bool,
    confirm_frames: u32,
    max_count: Option<u32>,
    miss: MissPolicy,
    refire: RefirePolicy,
}

impl Smoother {
    pub fn new(
        confirm_frames: u32,
        max_count: Option<u32>,
        miss: MissPolicy,
        refire: RefirePolicy,
    ) -> Self {
        Self {
            count: 0,
            active: false,
            confirm_frames: confirm_frames.max(1),
            max_count,
            miss,
            refire,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Apply one frame outcome.
    pub fn observe(&mut self, qualified: bool) -> SmoothStep {
        if qualified {
            self.count = self.count.saturating_add(1);
            if let Some(max) = self.max_count {
                self.count = self.count.min(max);
            }
        } else {
            self.count = match self.miss {
                MissPolicy::Decay => self.count.saturating_sub(1),
                MissPolicy::Reset => 0,
            };
        }

        let mut episode_ended = false;
        if self.active && self.count == 0 {
            self.active = false;
            episode_ended = true;
        }

        let mut fired = false;
        if qualified && self.count >= self.confirm_frames {
            match self.refire {
                RefirePolicy::Cooldown => {
                    if !self.active {
                        self.active = true;
                        fired = true;
                    }
                }
                RefirePolicy::ResetOnFire => {
                    self.count = 0;
                    fired = true;
                }
                RefirePolicy::Unsuppressed => {
                    self.active = true;
                    fired = true;
                }
            }
        }

        SmoothStep {
            count: self.count,
            fired,
            episode_active: self.active,
            episode_ended,
        }
    }
}
