//! The orchestrator.
//!
//! `SyncEngine` owns the cadence controller, the change-detection loop, the
//! status loop and the session resolver, and is the only place committed state
//! changes. It is sans-IO: `poll(now)` hands out the remote calls that are due,
//! the driver runs them and passes each [`Completion`] to `complete`.
//!
//! ```text
//!   driver ──poll(now)──▶ SyncEngine ──Vec<Work>──▶ driver ──execute──▶ SessionClient
//!     ▲                                                                     │
//!     └──────────── drain_events() ◀── complete(Completion, now) ◀──────────┘
//! ```
//!
//! # Stale Results
//!
//! Every completion names the ticket and identifier it was issued for. It is
//! committed only while the issuing loop is still waiting on that ticket, so
//! results that arrive after `stop()` or after the target changed are dropped.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use relay_protocol::{validate_identifier, StatusPayload};
use tracing::{debug, info, warn};

use crate::cadence::{CadenceController, CadenceShift, CadenceState};
use crate::client::SessionClient;
use crate::config::RelayConfig;
use crate::content::{ChangeDetector, ContentOutcome, RefreshRequest};
use crate::error::{AlertKind, RelayError, RemoteError, Result};
use crate::fingerprint::Fingerprint;
use crate::poll_loop::{Ticket, TicketCounter};
use crate::resolution::{PendingSend, ResolutionStep, SessionResolver};
use crate::status::StatusPoller;
use crate::types::{
    DialogAction, DialogResult, LivenessState, NewestSession, SendReceipt, SessionSnapshot,
};
use crate::work::{Completion, Work};

/// What the engine is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    /// An existing session. The workspace may be unknown until the first fetch
    /// reveals it.
    Session {
        session_id: String,
        workspace_id: Option<String>,
    },
    /// A workspace without a session yet; the first send creates one.
    Workspace { workspace_id: String },
}

impl SyncTarget {
    pub fn session(session_id: impl Into<String>) -> Self {
        SyncTarget::Session {
            session_id: session_id.into(),
            workspace_id: None,
        }
    }

    pub fn workspace(workspace_id: impl Into<String>) -> Self {
        SyncTarget::Workspace {
            workspace_id: workspace_id.into(),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            SyncTarget::Session { session_id, .. } => Some(session_id),
            SyncTarget::Workspace { .. } => None,
        }
    }

    pub fn workspace_id(&self) -> Option<&str> {
        match self {
            SyncTarget::Session { workspace_id, .. } => workspace_id.as_deref(),
            SyncTarget::Workspace { workspace_id } => Some(workspace_id),
        }
    }

    /// True when starting with `other` would not change what is polled. A
    /// session target whose workspace was discovered still covers the same
    /// session requested without one.
    fn covers(&self, other: &SyncTarget) -> bool {
        match (self, other) {
            (
                SyncTarget::Session {
                    session_id: a,
                    workspace_id: known,
                },
                SyncTarget::Session {
                    session_id: b,
                    workspace_id: requested,
                },
            ) => a == b && (requested.is_none() || requested == known),
            _ => self == other,
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(session_id) = self.session_id() {
            validate_identifier(session_id, "session_id")?;
        }
        if let Some(workspace_id) = self.workspace_id() {
            validate_identifier(workspace_id, "workspace_id")?;
        }
        Ok(())
    }
}

/// A user-visible notice. Degraded state is always paired with one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SessionCommitted {
        session_id: String,
        fingerprint: Fingerprint,
        message_count: usize,
    },
    SessionResolved {
        session_id: String,
    },
    LivenessUpdated(LivenessState),
    CadenceChanged(CadenceState),
    DialogChanged {
        action: DialogAction,
        message: String,
    },
    SendAccepted {
        session_id: Option<String>,
    },
    Alert(Alert),
}

pub struct SyncEngine {
    cadence: CadenceController,
    content: ChangeDetector,
    status: StatusPoller,
    resolver: SessionResolver,
    tickets: TicketCounter,
    target: Option<SyncTarget>,
    send_ticket: Option<Ticket>,
    dialog_ticket: Option<Ticket>,
    refreshing: bool,
    last_alert: Option<Alert>,
    events: VecDeque<EngineEvent>,
}

impl SyncEngine {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            cadence: CadenceController::new(config.cadence),
            content: ChangeDetector::new(),
            status: StatusPoller::new(),
            resolver: SessionResolver::new(config.resolution),
            tickets: TicketCounter::default(),
            target: None,
            send_ticket: None,
            dialog_ticket: None,
            refreshing: false,
            last_alert: None,
            events: VecDeque::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Binds the engine to `target` and arms the loops, first ticks due now.
    ///
    /// Starting with the current target again is a no-op. A different target
    /// stops everything first, so no timer or in-flight result of the old
    /// target survives.
    pub fn start(&mut self, target: SyncTarget, now: DateTime<Utc>) -> Result<()> {
        target.validate()?;
        if self.target.as_ref().is_some_and(|current| current.covers(&target)) {
            debug!(?target, "Engine already bound to target");
            return Ok(());
        }
        self.stop();

        info!(
            session_id = target.session_id().unwrap_or("-"),
            workspace_id = target.workspace_id().unwrap_or("-"),
            "Starting sync engine"
        );
        if let Some(session_id) = target.session_id() {
            self.content.start(session_id, now);
        }
        if let Some(workspace_id) = target.workspace_id() {
            self.status.start(workspace_id, now);
        }
        self.target = Some(target);
        Ok(())
    }

    /// Cancels every timer and forgets in-flight calls. Idempotent.
    pub fn stop(&mut self) {
        if self.target.is_none() {
            return;
        }
        info!("Stopping sync engine");
        self.content.stop();
        self.status.stop();
        self.resolver.cancel();
        self.cadence.reset();
        self.send_ticket = None;
        self.dialog_ticket = None;
        self.refreshing = false;
        self.target = None;
    }

    pub fn is_running(&self) -> bool {
        self.target.is_some()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read-only view
    // ─────────────────────────────────────────────────────────────────────────

    pub fn target(&self) -> Option<&SyncTarget> {
        self.target.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.content.session_id()
    }

    pub fn workspace_id(&self) -> Option<&str> {
        self.target.as_ref().and_then(SyncTarget::workspace_id)
    }

    pub fn session(&self) -> Option<&SessionSnapshot> {
        self.content.snapshot()
    }

    pub fn cadence_state(&self) -> CadenceState {
        self.cadence.state()
    }

    pub fn liveness(&self) -> Option<&LivenessState> {
        self.status.liveness()
    }

    pub fn content_error(&self) -> Option<&RemoteError> {
        self.content.error()
    }

    pub fn pending_send(&self) -> Option<&PendingSend> {
        self.resolver.pending()
    }

    /// True from the moment a send is issued until it either fails or its
    /// session id is known.
    pub fn is_sending(&self) -> bool {
        self.send_ticket.is_some() || self.resolver.is_active()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    pub fn last_alert(&self) -> Option<&Alert> {
        self.last_alert.as_ref()
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scheduling
    // ─────────────────────────────────────────────────────────────────────────

    /// Earliest moment `poll` has something to do.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        [
            self.content.due_at(),
            self.status.due_at(),
            self.resolver.due_at(),
            self.cadence.decay_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Fires the decay timer if due, then issues every loop call that is due.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<Work> {
        let shift = self.cadence.poll_decay(now);
        if shift.any() {
            debug!("Cadence decayed to baseline");
        }
        self.apply_shift(shift, now);

        let sending = self.is_sending();
        let content_period = self.cadence.content_period();
        let mut work = Vec::new();
        if let Some((ticket, session_id)) =
            self.content
                .take_due(now, sending, content_period, &mut self.tickets)
        {
            work.push(Work::FetchSession { ticket, session_id });
        }
        if let Some((ticket, workspace_id)) = self.status.take_due(now, &mut self.tickets) {
            work.push(Work::FetchLiveness {
                ticket,
                workspace_id,
            });
        }
        if let Some((ticket, workspace_id)) = self.resolver.take_due(now, &mut self.tickets) {
            work.push(Work::FetchNewestSession {
                ticket,
                workspace_id,
            });
        }
        work
    }

    /// Polls once and runs the due calls to completion against `client`.
    /// Returns how many calls ran.
    pub fn run_due(&mut self, client: &dyn SessionClient, now: DateTime<Utc>) -> usize {
        let work = self.poll(now);
        let count = work.len();
        for item in work {
            self.perform(client, item, now);
        }
        count
    }

    pub fn perform(&mut self, client: &dyn SessionClient, work: Work, now: DateTime<Utc>) {
        let completion = work.execute(client);
        self.complete(completion, now);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Intents
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetches the session now. `Ok(None)` means a fetch already in flight
    /// will serve the refresh, so no second call is issued.
    pub fn manual_refresh(&mut self, now: DateTime<Utc>) -> Result<Option<Work>> {
        let session_id = self
            .content
            .session_id()
            .map(str::to_string)
            .ok_or_else(|| RelayError::Busy("no session to refresh".to_string()))?;

        let sending = self.is_sending();
        match self.content.request_refresh(now, sending, &mut self.tickets) {
            RefreshRequest::Issued(ticket) => {
                self.refreshing = true;
                Ok(Some(Work::FetchSession { ticket, session_id }))
            }
            RefreshRequest::Joined => {
                self.refreshing = true;
                Ok(None)
            }
            RefreshRequest::Refused(reason) => Err(RelayError::Busy(reason.to_string())),
        }
    }

    /// Sends to the current session, or creates one when there is none.
    pub fn send_message(&mut self, text: &str) -> Result<Work> {
        let session_id = self.content.session_id().map(str::to_string);
        self.begin_send(text, session_id)
    }

    /// Sends without a session id; the remote creates the session. When the
    /// reply carries no id the resolver discovers it.
    pub fn create_and_send(&mut self, text: &str) -> Result<Work> {
        self.begin_send(text, None)
    }

    pub fn toggle_dialog(&mut self) -> Result<Work> {
        self.set_dialog(DialogAction::Toggle)
    }

    pub fn set_dialog(&mut self, action: DialogAction) -> Result<Work> {
        let workspace_id = self
            .workspace_id()
            .map(str::to_string)
            .ok_or_else(|| RelayError::Busy("workspace is not known yet".to_string()))?;
        if self.dialog_ticket.is_some() {
            return Err(RelayError::Busy("a dialog change is in flight".to_string()));
        }
        let ticket = self.tickets.issue();
        self.dialog_ticket = Some(ticket);
        Ok(Work::SetDialog {
            ticket,
            workspace_id,
            action,
        })
    }

    fn begin_send(&mut self, text: &str, session_id: Option<String>) -> Result<Work> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RelayError::EmptyMessage);
        }
        if self.is_sending() {
            return Err(RelayError::Busy("a send is already in flight".to_string()));
        }
        let workspace_id = self
            .workspace_id()
            .map(str::to_string)
            .ok_or_else(|| RelayError::Busy("workspace is not known yet".to_string()))?;

        let ticket = self.tickets.issue();
        self.send_ticket = Some(ticket);
        Ok(Work::SendMessage {
            ticket,
            workspace_id,
            text: text.to_string(),
            session_id,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Completions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn complete(&mut self, completion: Completion, now: DateTime<Utc>) {
        match completion {
            Completion::Session {
                ticket,
                session_id,
                result,
            } => self.complete_session(ticket, &session_id, result, now),
            Completion::Liveness {
                ticket,
                workspace_id,
                result,
            } => self.complete_liveness(ticket, &workspace_id, result, now),
            Completion::NewestSession { ticket, result, .. } => {
                self.complete_resolution(ticket, result, now)
            }
            Completion::Send {
                ticket,
                workspace_id,
                text,
                session_id,
                result,
            } => self.complete_send(ticket, &workspace_id, &text, session_id, result, now),
            Completion::Dialog {
                ticket,
                action,
                result,
                ..
            } => self.complete_dialog(ticket, action, result, now),
        }
    }

    fn complete_session(
        &mut self,
        ticket: Ticket,
        session_id: &str,
        result: std::result::Result<SessionSnapshot, RemoteError>,
        now: DateTime<Utc>,
    ) {
        let previous_kind = self.content.error().map(RemoteError::kind);
        let period = self.cadence.content_period();
        let outcome = self.content.complete(ticket, session_id, result, now, period);
        // A stale result can land while a newer, joined fetch is still running.
        self.refreshing = self.content.is_in_flight();
        match outcome {
            ContentOutcome::Stale | ContentOutcome::Unchanged => {}
            ContentOutcome::Committed => self.on_session_committed(now),
            // One banner per failure kind; a repeat of the same failure stays quiet.
            ContentOutcome::Failed(err) => {
                if previous_kind != Some(err.kind()) {
                    self.raise_remote(&err, now);
                }
            }
        }
    }

    fn on_session_committed(&mut self, now: DateTime<Utc>) {
        let Some(snapshot) = self.content.snapshot() else {
            return;
        };
        let event = EngineEvent::SessionCommitted {
            session_id: snapshot.id.clone(),
            fingerprint: snapshot.fingerprint.clone(),
            message_count: snapshot.messages.len(),
        };
        let revealed = snapshot.workspace_id.clone();
        self.events.push_back(event);
        self.adopt_workspace(&revealed, now);

        let shift = self.cadence.on_confirmed_change(now);
        self.apply_shift(shift, now);
    }

    /// The fetched session names its workspace; bind the status loop to it.
    fn adopt_workspace(&mut self, workspace_id: &str, now: DateTime<Utc>) {
        if workspace_id.is_empty() || self.status.workspace_id() == Some(workspace_id) {
            return;
        }
        if let Err(err) = validate_identifier(workspace_id, "workspace_id") {
            warn!(workspace_id = %workspace_id, reason = err.reason, "Ignoring unusable workspace id");
            return;
        }
        info!(workspace_id = %workspace_id, "Workspace discovered from session");
        if let Some(SyncTarget::Session {
            workspace_id: known,
            ..
        }) = self.target.as_mut()
        {
            *known = Some(workspace_id.to_string());
        }
        self.status.start(workspace_id, now);
    }

    fn complete_liveness(
        &mut self,
        ticket: Ticket,
        workspace_id: &str,
        result: std::result::Result<StatusPayload, RemoteError>,
        now: DateTime<Utc>,
    ) {
        let previous_kind = self
            .status
            .liveness()
            .and_then(|state| state.error.as_ref())
            .map(RemoteError::kind);
        let period = self.cadence.status_period();
        let Some(state) = self
            .status
            .complete(ticket, workspace_id, result, now, period)
            .cloned()
        else {
            return;
        };
        if let Some(err) = state.error.as_ref() {
            if previous_kind != Some(err.kind()) {
                self.raise_remote(err, now);
            }
        }
        self.events.push_back(EngineEvent::LivenessUpdated(state));
    }

    fn complete_send(
        &mut self,
        ticket: Ticket,
        workspace_id: &str,
        text: &str,
        session_id: Option<String>,
        result: std::result::Result<SendReceipt, RemoteError>,
        now: DateTime<Utc>,
    ) {
        if self.send_ticket != Some(ticket) || self.workspace_id() != Some(workspace_id) {
            debug!(ticket = ticket.value(), "Dropping stale send result");
            return;
        }
        self.send_ticket = None;

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(workspace_id = %workspace_id, error = %err, "Send failed");
                self.raise_remote(&err, now);
                return;
            }
        };
        if !receipt.accepted {
            let detail = receipt
                .error
                .unwrap_or_else(|| "send was not accepted".to_string());
            warn!(workspace_id = %workspace_id, detail = %detail, "Send refused");
            self.raise(AlertKind::SendFailed, detail, now);
            return;
        }

        info!(workspace_id = %workspace_id, "Send accepted");
        let shift = self.cadence.on_send_accepted(now);
        self.apply_shift(shift, now);
        self.events.push_back(EngineEvent::SendAccepted {
            session_id: receipt.new_session_id.clone().or(session_id.clone()),
        });

        if session_id.is_some() {
            return;
        }
        match receipt.new_session_id {
            Some(new_id) => self.adopt_session(&new_id, now),
            None => self.resolver.begin(workspace_id, text, now),
        }
    }

    fn complete_resolution(
        &mut self,
        ticket: Ticket,
        result: std::result::Result<Option<NewestSession>, RemoteError>,
        now: DateTime<Utc>,
    ) {
        match self.resolver.complete(ticket, result, now) {
            ResolutionStep::Resolved { session_id } => self.adopt_session(&session_id, now),
            ResolutionStep::Retry { .. } | ResolutionStep::Stale => {}
            ResolutionStep::Exhausted { attempts } => {
                let err = RelayError::ResolutionTimeout { attempts };
                self.raise(AlertKind::ResolutionTimeout, err.to_string(), now);
            }
        }
    }

    /// Retargets the content loop at a session the remote just created. The
    /// cadence keeps its acceleration from the send.
    fn adopt_session(&mut self, session_id: &str, now: DateTime<Utc>) {
        if let Err(err) = validate_identifier(session_id, "session_id") {
            let detail = format!("remote returned an unusable session id: {}", err.reason);
            self.raise(AlertKind::Transport, detail, now);
            return;
        }
        let Some(workspace_id) = self.workspace_id().map(str::to_string) else {
            return;
        };
        info!(session_id = %session_id, workspace_id = %workspace_id, "Session id resolved");

        self.content.start(session_id, now);
        self.target = Some(SyncTarget::Session {
            session_id: session_id.to_string(),
            workspace_id: Some(workspace_id),
        });
        self.events.push_back(EngineEvent::SessionResolved {
            session_id: session_id.to_string(),
        });
    }

    fn complete_dialog(
        &mut self,
        ticket: Ticket,
        action: DialogAction,
        result: std::result::Result<DialogResult, RemoteError>,
        now: DateTime<Utc>,
    ) {
        if self.dialog_ticket != Some(ticket) {
            debug!(ticket = ticket.value(), "Dropping stale dialog result");
            return;
        }
        self.dialog_ticket = None;

        match result {
            Ok(outcome) if outcome.success => {
                info!(action = action.as_str(), "Dialog changed");
                self.events.push_back(EngineEvent::DialogChanged {
                    action,
                    message: outcome.message,
                });
                self.status.expedite(now);
            }
            Ok(outcome) => self.raise(AlertKind::Dialog, outcome.message, now),
            Err(err) => self.raise_remote(&err, now),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn apply_shift(&mut self, shift: CadenceShift, now: DateTime<Utc>) {
        if shift.content {
            self.content.restart(now, self.cadence.content_period());
        }
        if shift.status {
            self.status.restart(now, self.cadence.status_period());
        }
        if shift.any() {
            self.events
                .push_back(EngineEvent::CadenceChanged(self.cadence.state()));
        }
    }

    fn raise_remote(&mut self, err: &RemoteError, now: DateTime<Utc>) {
        self.raise(err.kind(), err.to_string(), now);
    }

    fn raise(&mut self, kind: AlertKind, detail: String, now: DateTime<Utc>) {
        let alert = Alert {
            kind,
            message: kind.user_message().to_string(),
            detail,
            raised_at: now,
        };
        self.last_alert = Some(alert.clone());
        self.events.push_back(EngineEvent::Alert(alert));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SyncEngine {
        SyncEngine::new(&RelayConfig::default())
    }

    #[test]
    fn start_rejects_placeholder_ids() {
        let mut engine = engine();
        let err = engine
            .start(SyncTarget::session("undefined"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidIdentifier { .. }));
        assert!(!engine.is_running());
    }

    #[test]
    fn start_is_idempotent() {
        let mut engine = engine();
        let now = Utc::now();
        engine.start(SyncTarget::session("s1"), now).unwrap();
        let work = engine.poll(now);
        assert_eq!(work.len(), 1);

        engine.start(SyncTarget::session("s1"), now).unwrap();
        assert!(engine.poll(now).is_empty());
    }

    #[test]
    fn stop_clears_every_deadline() {
        let mut engine = engine();
        let now = Utc::now();
        engine
            .start(
                SyncTarget::Session {
                    session_id: "s1".to_string(),
                    workspace_id: Some("w1".to_string()),
                },
                now,
            )
            .unwrap();
        assert_eq!(engine.next_deadline(), Some(now));

        engine.stop();
        engine.stop();
        assert_eq!(engine.next_deadline(), None);
        assert!(engine.poll(now).is_empty());
    }

    #[test]
    fn workspace_target_only_polls_status() {
        let mut engine = engine();
        let now = Utc::now();
        engine.start(SyncTarget::workspace("w1"), now).unwrap();
        let work = engine.poll(now);
        assert!(matches!(work.as_slice(), [Work::FetchLiveness { .. }]));
        assert!(engine.manual_refresh(now).is_err());
    }

    #[test]
    fn blank_message_is_refused() {
        let mut engine = engine();
        let now = Utc::now();
        engine.start(SyncTarget::workspace("w1"), now).unwrap();
        assert!(matches!(
            engine.send_message("   "),
            Err(RelayError::EmptyMessage)
        ));
    }

    #[test]
    fn second_send_is_refused_while_first_is_in_flight() {
        let mut engine = engine();
        let now = Utc::now();
        engine.start(SyncTarget::workspace("w1"), now).unwrap();
        let work = engine.send_message("  hello ").unwrap();
        assert!(matches!(work, Work::SendMessage { ref text, .. } if text == "hello"));
        assert!(engine.is_sending());
        assert!(matches!(
            engine.send_message("again"),
            Err(RelayError::Busy(_))
        ));
    }
}
