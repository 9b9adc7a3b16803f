//! Status-polling loop.
//!
//! Liveness is cheap and always current, so every result is committed as-is.
//! A failed check commits `{remote_active: false, dialog_open: false}` with the
//! error attached rather than keeping the previous value.

use chrono::{DateTime, Duration, Utc};
use relay_protocol::StatusPayload;
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::poll_loop::{PollLoop, Ticket, TicketCounter};
use crate::types::LivenessState;

#[derive(Debug, Default)]
pub struct StatusPoller {
    timer: PollLoop,
    workspace_id: Option<String>,
    liveness: Option<LivenessState>,
}

impl StatusPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, workspace_id: &str, now: DateTime<Utc>) {
        if self.workspace_id.as_deref() != Some(workspace_id) {
            self.liveness = None;
        }
        self.workspace_id = Some(workspace_id.to_string());
        self.timer.start(now);
    }

    pub fn stop(&mut self) {
        self.timer.stop();
        self.workspace_id = None;
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn workspace_id(&self) -> Option<&str> {
        self.workspace_id.as_deref()
    }

    pub fn liveness(&self) -> Option<&LivenessState> {
        self.liveness.as_ref()
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.timer.due_at()
    }

    pub fn take_due(
        &mut self,
        now: DateTime<Utc>,
        tickets: &mut TicketCounter,
    ) -> Option<(Ticket, String)> {
        let workspace_id = self.workspace_id.clone()?;
        let ticket = self.timer.take_due(now, tickets)?;
        Some((ticket, workspace_id))
    }

    /// Returns the committed state, or `None` when the result was stale.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        workspace_id: &str,
        result: Result<StatusPayload, RemoteError>,
        now: DateTime<Utc>,
        period: Duration,
    ) -> Option<&LivenessState> {
        if self.workspace_id.as_deref() != Some(workspace_id)
            || !self.timer.settle(ticket, now, period)
        {
            debug!(workspace_id = %workspace_id, "Dropping stale status result");
            return None;
        }

        let liveness = match result {
            Ok(payload) => LivenessState::observed(payload, now),
            Err(err) => {
                warn!(workspace_id = %workspace_id, error = %err, "Status check failed");
                LivenessState::degraded(err, now)
            }
        };
        self.liveness = Some(liveness);
        self.liveness.as_ref()
    }

    pub fn restart(&mut self, now: DateTime<Utc>, period: Duration) {
        self.timer.restart(now, period);
    }

    /// Asks for a check at the next opportunity, e.g. after a dialog toggle.
    pub fn expedite(&mut self, now: DateTime<Utc>) {
        self.timer.expedite(now);
    }
}
