//! Timer state machine shared by the polling loops.
//!
//! ```text
//!   start          due             settle(ticket)
//! Idle ──▶ Scheduled ──▶ InFlight ─────────────▶ Scheduled(now + period)
//!   ▲          │                                     │
//!   └── stop ──┴─────────────────────────────────────┘
//! ```
//!
//! There is no wall-clock timer inside: callers pass `now` and ask what is due,
//! which keeps every loop deterministic under test. A loop is re-armed only
//! when its in-flight call settles, so two calls of the same kind never overlap.

use chrono::{DateTime, Duration, Utc};

/// `now + period`, saturating at the latest representable instant.
pub(crate) fn deadline_after(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    now.checked_add_signed(period).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Identifies one issued remote call. Completions carrying any other ticket
/// are stale and get dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct TicketCounter {
    next: u64,
}

impl TicketCounter {
    pub fn issue(&mut self) -> Ticket {
        self.next += 1;
        Ticket(self.next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Scheduled {
        due_at: DateTime<Utc>,
    },
    InFlight {
        ticket: Ticket,
        started_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct PollLoop {
    phase: LoopPhase,
}

impl Default for PollLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl PollLoop {
    pub fn new() -> Self {
        Self {
            phase: LoopPhase::Idle,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.phase, LoopPhase::Idle)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.phase, LoopPhase::InFlight { .. })
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        match self.phase {
            LoopPhase::Scheduled { due_at } => Some(due_at),
            _ => None,
        }
    }

    /// Arms the loop with its first tick due immediately.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.phase = LoopPhase::Scheduled { due_at: now };
    }

    pub fn stop(&mut self) {
        self.phase = LoopPhase::Idle;
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.phase, LoopPhase::Scheduled { due_at } if due_at <= now)
    }

    /// Moves a due loop in flight.
    pub fn take_due(&mut self, now: DateTime<Utc>, tickets: &mut TicketCounter) -> Option<Ticket> {
        if !self.is_due(now) {
            return None;
        }
        Some(self.launch(now, tickets))
    }

    /// Issues a call right away, replacing the pending tick. Returns `None`
    /// when a call is already in flight or the loop is stopped.
    pub fn begin_now(&mut self, now: DateTime<Utc>, tickets: &mut TicketCounter) -> Option<Ticket> {
        match self.phase {
            LoopPhase::Scheduled { .. } => Some(self.launch(now, tickets)),
            LoopPhase::Idle | LoopPhase::InFlight { .. } => None,
        }
    }

    /// Drops a due tick without issuing a call and waits a full period.
    pub fn skip(&mut self, now: DateTime<Utc>, period: Duration) {
        if self.is_due(now) {
            self.phase = LoopPhase::Scheduled {
                due_at: deadline_after(now, period),
            };
        }
    }

    /// Re-arms after the call identified by `ticket` settled. Returns false
    /// for a stale ticket, in which case nothing changes.
    pub fn settle(&mut self, ticket: Ticket, now: DateTime<Utc>, period: Duration) -> bool {
        match self.phase {
            LoopPhase::InFlight {
                ticket: current, ..
            } if current == ticket => {
                self.phase = LoopPhase::Scheduled {
                    due_at: deadline_after(now, period),
                };
                true
            }
            _ => false,
        }
    }

    /// Restarts a pending tick with a new period. An in-flight loop picks the
    /// new period up when it settles.
    pub fn restart(&mut self, now: DateTime<Utc>, period: Duration) {
        if let LoopPhase::Scheduled { .. } = self.phase {
            self.phase = LoopPhase::Scheduled {
                due_at: deadline_after(now, period),
            };
        }
    }

    /// Pulls a pending tick forward to `now`.
    pub fn expedite(&mut self, now: DateTime<Utc>) {
        if let LoopPhase::Scheduled { due_at } = self.phase {
            if due_at > now {
                self.phase = LoopPhase::Scheduled { due_at: now };
            }
        }
    }

    fn launch(&mut self, now: DateTime<Utc>, tickets: &mut TicketCounter) -> Ticket {
        let ticket = tickets.issue();
        self.phase = LoopPhase::InFlight {
            ticket,
            started_at: now,
        };
        ticket
    }
}
