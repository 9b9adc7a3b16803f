//! Change-detection loop.
//!
//! Each tick fetches the session, fingerprints its messages and commits a new
//! snapshot only when the fingerprint differs from the last committed one.
//! Failed fetches leave the last snapshot in place, record the error and keep
//! the timer running.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::fingerprint::{is_change, Fingerprint};
use crate::poll_loop::{PollLoop, Ticket, TicketCounter};
use crate::types::SessionSnapshot;

#[derive(Debug, Clone, PartialEq)]
pub enum ContentOutcome {
    Committed,
    Unchanged,
    Failed(RemoteError),
    /// The session changed or the loop stopped while the call was in flight.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshRequest {
    Issued(Ticket),
    /// A fetch is already in flight and will serve this refresh.
    Joined,
    Refused(&'static str),
}

#[derive(Debug, Default)]
pub struct ChangeDetector {
    timer: PollLoop,
    session_id: Option<String>,
    snapshot: Option<SessionSnapshot>,
    last_fingerprint: Option<Fingerprint>,
    error: Option<RemoteError>,
    commits: u64,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, session_id: &str, now: DateTime<Utc>) {
        if self.session_id.as_deref() != Some(session_id) {
            self.snapshot = None;
            self.last_fingerprint = None;
            self.error = None;
            self.commits = 0;
        }
        self.session_id = Some(session_id.to_string());
        self.timer.start(now);
    }

    pub fn stop(&mut self) {
        self.timer.stop();
        self.session_id = None;
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn error(&self) -> Option<&RemoteError> {
        self.error.as_ref()
    }

    /// Number of snapshots committed since `start`.
    pub fn commits(&self) -> u64 {
        self.commits
    }

    pub fn is_in_flight(&self) -> bool {
        self.timer.is_in_flight()
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.timer.due_at()
    }

    pub fn timer(&self) -> &PollLoop {
        &self.timer
    }

    /// Issues the scheduled fetch if due. While a send is in flight a due
    /// tick is skipped entirely so a read cannot race the write.
    pub fn take_due(
        &mut self,
        now: DateTime<Utc>,
        send_in_flight: bool,
        period: Duration,
        tickets: &mut TicketCounter,
    ) -> Option<(Ticket, String)> {
        let session_id = self.session_id.clone()?;
        if send_in_flight && self.timer.is_due(now) {
            debug!(session_id = %session_id, "Skipping content tick while a send is in flight");
            self.timer.skip(now, period);
            return None;
        }
        let ticket = self.timer.take_due(now, tickets)?;
        Some((ticket, session_id))
    }

    /// Manual refresh: the same fetch as a tick, issued now. The pending tick
    /// is replaced rather than run in addition.
    pub fn request_refresh(
        &mut self,
        now: DateTime<Utc>,
        send_in_flight: bool,
        tickets: &mut TicketCounter,
    ) -> RefreshRequest {
        if self.session_id.is_none() {
            return RefreshRequest::Refused("no session to refresh");
        }
        if send_in_flight {
            return RefreshRequest::Refused("a send is in flight");
        }
        if self.timer.is_in_flight() {
            return RefreshRequest::Joined;
        }
        match self.timer.begin_now(now, tickets) {
            Some(ticket) => RefreshRequest::Issued(ticket),
            None => RefreshRequest::Refused("content loop is stopped"),
        }
    }

    pub fn complete(
        &mut self,
        ticket: Ticket,
        session_id: &str,
        result: Result<SessionSnapshot, RemoteError>,
        now: DateTime<Utc>,
        period: Duration,
    ) -> ContentOutcome {
        if self.session_id.as_deref() != Some(session_id) || !self.timer.settle(ticket, now, period)
        {
            debug!(
                session_id = %session_id,
                ticket = ticket.value(),
                "Dropping stale content result"
            );
            return ContentOutcome::Stale;
        }

        match result {
            Ok(snapshot) => {
                self.error = None;
                if !is_change(self.last_fingerprint.as_ref(), &snapshot.fingerprint) {
                    return ContentOutcome::Unchanged;
                }
                info!(
                    session_id = %session_id,
                    fingerprint = %snapshot.fingerprint,
                    messages = snapshot.messages.len(),
                    "Session content changed"
                );
                self.last_fingerprint = Some(snapshot.fingerprint.clone());
                self.snapshot = Some(snapshot);
                self.commits += 1;
                ContentOutcome::Committed
            }
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Session fetch failed");
                self.error = Some(err.clone());
                ContentOutcome::Failed(err)
            }
        }
    }

    pub fn restart(&mut self, now: DateTime<Utc>, period: Duration) {
        self.timer.restart(now, period);
    }
}
