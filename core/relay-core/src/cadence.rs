//! Polling cadence for the content and status loops.
//!
//! Each category is either at its baseline period or its accelerated period,
//! nothing in between. Remote edits arrive in bursts, so a successful send or
//! a confirmed content change speeds polling up and a single decay timer
//! brings both categories back to baseline after a quiet window.
//!
//! ```text
//!              send accepted / confirmed change
//!   Baseline ───────────────────────────────────▶ Accelerated
//!      ▲                                              │
//!      └──────── decay timer (quiet window) ──────────┘
//! ```
//!
//! Polls that find nothing new never touch the cadence.

use chrono::{DateTime, Duration, Utc};

use crate::config::CadenceConfig;
use crate::poll_loop::deadline_after;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    Baseline,
    Accelerated,
}

/// Read-only view for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CadenceState {
    pub content_period_ms: u64,
    pub status_period_ms: u64,
    pub baseline_content_ms: u64,
    pub accelerated_content_ms: u64,
    pub baseline_status_ms: u64,
    pub accelerated_status_ms: u64,
    pub last_change_at: Option<DateTime<Utc>>,
}

impl CadenceState {
    pub fn is_accelerated(&self) -> bool {
        self.content_period_ms != self.baseline_content_ms
            || self.status_period_ms != self.baseline_status_ms
    }
}

/// Which periods moved, so the caller can restart the matching timers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CadenceShift {
    pub content: bool,
    pub status: bool,
}

impl CadenceShift {
    pub fn any(&self) -> bool {
        self.content || self.status
    }
}

#[derive(Debug, Clone)]
pub struct CadenceController {
    config: CadenceConfig,
    content: Pace,
    status: Pace,
    last_change_at: Option<DateTime<Utc>>,
    decay_at: Option<DateTime<Utc>>,
}

impl CadenceController {
    pub fn new(config: CadenceConfig) -> Self {
        Self {
            config,
            content: Pace::Baseline,
            status: Pace::Baseline,
            last_change_at: None,
            decay_at: None,
        }
    }

    pub fn reset(&mut self) {
        self.content = Pace::Baseline;
        self.status = Pace::Baseline;
        self.last_change_at = None;
        self.decay_at = None;
    }

    pub fn content_pace(&self) -> Pace {
        self.content
    }

    pub fn status_pace(&self) -> Pace {
        self.status
    }

    pub fn content_period(&self) -> Duration {
        millis(match self.content {
            Pace::Baseline => self.config.baseline_content_ms,
            Pace::Accelerated => self.config.accelerated_content_ms,
        })
    }

    pub fn status_period(&self) -> Duration {
        millis(match self.status {
            Pace::Baseline => self.config.baseline_status_ms,
            Pace::Accelerated => self.config.accelerated_status_ms,
        })
    }

    pub fn decay_deadline(&self) -> Option<DateTime<Utc>> {
        self.decay_at
    }

    /// A send was accepted: the remote is about to change. Both categories
    /// speed up and the decay timer is armed from now, so acceleration cannot
    /// outlive a send that never produces a visible change.
    pub fn on_send_accepted(&mut self, now: DateTime<Utc>) -> CadenceShift {
        let shift = CadenceShift {
            content: self.content != Pace::Accelerated,
            status: self.status != Pace::Accelerated,
        };
        self.content = Pace::Accelerated;
        self.status = Pace::Accelerated;
        self.decay_at = Some(deadline_after(now, millis(self.config.decay_after_ms)));
        shift
    }

    /// A content change was committed. Content polling (re)enters the
    /// accelerated period and the decay timer restarts from `now`.
    pub fn on_confirmed_change(&mut self, now: DateTime<Utc>) -> CadenceShift {
        let shift = CadenceShift {
            content: self.content != Pace::Accelerated,
            status: false,
        };
        self.content = Pace::Accelerated;
        self.last_change_at = Some(now);
        self.decay_at = Some(deadline_after(now, millis(self.config.decay_after_ms)));
        shift
    }

    /// Fires the decay timer if it is due.
    pub fn poll_decay(&mut self, now: DateTime<Utc>) -> CadenceShift {
        match self.decay_at {
            Some(deadline) if deadline <= now => {}
            _ => return CadenceShift::default(),
        }
        self.decay_at = None;

        let shift = CadenceShift {
            content: self.content == Pace::Accelerated,
            status: self.status == Pace::Accelerated,
        };
        self.content = Pace::Baseline;
        self.status = Pace::Baseline;
        shift
    }

    pub fn state(&self) -> CadenceState {
        CadenceState {
            content_period_ms: self.content_period().num_milliseconds() as u64,
            status_period_ms: self.status_period().num_milliseconds() as u64,
            baseline_content_ms: self.config.baseline_content_ms,
            accelerated_content_ms: self.config.accelerated_content_ms,
            baseline_status_ms: self.config.baseline_status_ms,
            accelerated_status_ms: self.config.accelerated_status_ms,
            last_change_at: self.last_change_at,
        }
    }
}

pub(crate) fn millis(ms: u64) -> Duration {
    i64::try_from(ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .unwrap_or(Duration::MAX)
}
