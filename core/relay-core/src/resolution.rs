//! Session resolution after a send the remote accepted without an id.
//!
//! The remote assigns ids asynchronously, so the resolver polls "newest session
//! for workspace" until it finds one holding a user message equal to the text
//! just sent. "Newest" races with unrelated remote activity; an id is never
//! accepted without that content match.
//!
//! Attempts are bounded. The first runs immediately, later ones wait
//! `retry_delay_ms`, and a failed call counts as an attempt. After the last
//! attempt there is no further wait: the resolver gives up at once.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cadence::millis;
use crate::config::ResolutionConfig;
use crate::error::RemoteError;
use crate::poll_loop::{deadline_after, Ticket, TicketCounter};
use crate::types::NewestSession;

/// A send awaiting its session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub workspace_id: String,
    pub message_text: String,
    pub attempt_count: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionStep {
    Resolved { session_id: String },
    Retry { next_at: DateTime<Utc> },
    Exhausted { attempts: u32 },
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting { due_at: DateTime<Utc> },
    InFlight { ticket: Ticket },
}

#[derive(Debug)]
pub struct SessionResolver {
    config: ResolutionConfig,
    pending: Option<(PendingSend, Phase)>,
}

impl SessionResolver {
    pub fn new(config: ResolutionConfig) -> Self {
        Self {
            config,
            pending: None,
        }
    }

    pub fn begin(&mut self, workspace_id: &str, message_text: &str, now: DateTime<Utc>) {
        info!(
            workspace_id = %workspace_id,
            max_attempts = self.config.max_attempts,
            "Resolving session for accepted send"
        );
        let pending = PendingSend {
            workspace_id: workspace_id.to_string(),
            message_text: message_text.to_string(),
            attempt_count: 0,
            started_at: now,
        };
        self.pending = Some((pending, Phase::Waiting { due_at: now }));
    }

    pub fn cancel(&mut self) {
        if let Some((pending, _)) = self.pending.take() {
            debug!(
                workspace_id = %pending.workspace_id,
                attempts = pending.attempt_count,
                "Session resolution cancelled"
            );
        }
    }

    pub fn pending(&self) -> Option<&PendingSend> {
        self.pending.as_ref().map(|(pending, _)| pending)
    }

    pub fn is_active(&self) -> bool {
        self.pending.is_some()
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        match self.pending {
            Some((_, Phase::Waiting { due_at })) => Some(due_at),
            _ => None,
        }
    }

    pub fn take_due(
        &mut self,
        now: DateTime<Utc>,
        tickets: &mut TicketCounter,
    ) -> Option<(Ticket, String)> {
        let (pending, phase) = self.pending.as_mut()?;
        match *phase {
            Phase::Waiting { due_at } if due_at <= now => {}
            _ => return None,
        }
        pending.attempt_count += 1;
        let ticket = tickets.issue();
        *phase = Phase::InFlight { ticket };
        debug!(
            workspace_id = %pending.workspace_id,
            attempt = pending.attempt_count,
            "Polling newest session"
        );
        Some((ticket, pending.workspace_id.clone()))
    }

    pub fn complete(
        &mut self,
        ticket: Ticket,
        result: Result<Option<NewestSession>, RemoteError>,
        now: DateTime<Utc>,
    ) -> ResolutionStep {
        let Some((pending, phase)) = self.pending.as_mut() else {
            return ResolutionStep::Stale;
        };
        if *phase != (Phase::InFlight { ticket }) {
            return ResolutionStep::Stale;
        }

        match result {
            Ok(Some(newest)) if newest.contains_user_text(&pending.message_text) => {
                info!(
                    session_id = %newest.id,
                    attempt = pending.attempt_count,
                    "Session resolved"
                );
                self.pending = None;
                return ResolutionStep::Resolved {
                    session_id: newest.id,
                };
            }
            Ok(Some(newest)) => {
                debug!(
                    candidate = %newest.id,
                    attempt = pending.attempt_count,
                    "Newest session does not hold the sent message yet"
                );
            }
            Ok(None) => {
                debug!(attempt = pending.attempt_count, "No session in workspace yet");
            }
            Err(err) => {
                warn!(
                    attempt = pending.attempt_count,
                    error = %err,
                    "Newest-session lookup failed"
                );
            }
        }

        if pending.attempt_count >= self.config.max_attempts {
            let attempts = pending.attempt_count;
            warn!(attempts, "Session resolution exhausted");
            self.pending = None;
            return ResolutionStep::Exhausted { attempts };
        }

        let next_at = deadline_after(now, millis(self.config.retry_delay_ms));
        *phase = Phase::Waiting { due_at: next_at };
        ResolutionStep::Retry { next_at }
    }
}
