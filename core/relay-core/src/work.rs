//! Remote calls the engine asks its driver to run.
//!
//! The engine never performs I/O itself. It hands out `Work`, the driver runs
//! it against a [`SessionClient`] and feeds the resulting [`Completion`] back.
//! Both carry the ticket and identifier the call was issued for, which is what
//! the stale-result guard checks.

use relay_protocol::StatusPayload;

use crate::client::SessionClient;
use crate::error::RemoteError;
use crate::poll_loop::Ticket;
use crate::types::{DialogAction, DialogResult, NewestSession, SendReceipt, SessionSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Work {
    FetchSession {
        ticket: Ticket,
        session_id: String,
    },
    FetchLiveness {
        ticket: Ticket,
        workspace_id: String,
    },
    FetchNewestSession {
        ticket: Ticket,
        workspace_id: String,
    },
    SendMessage {
        ticket: Ticket,
        workspace_id: String,
        text: String,
        session_id: Option<String>,
    },
    SetDialog {
        ticket: Ticket,
        workspace_id: String,
        action: DialogAction,
    },
}

impl Work {
    pub fn ticket(&self) -> Ticket {
        match self {
            Work::FetchSession { ticket, .. }
            | Work::FetchLiveness { ticket, .. }
            | Work::FetchNewestSession { ticket, .. }
            | Work::SendMessage { ticket, .. }
            | Work::SetDialog { ticket, .. } => *ticket,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Work::FetchSession { .. } => "fetch_session",
            Work::FetchLiveness { .. } => "fetch_liveness",
            Work::FetchNewestSession { .. } => "fetch_newest_session",
            Work::SendMessage { .. } => "send_message",
            Work::SetDialog { .. } => "set_dialog",
        }
    }

    /// Runs the call. Never retries; a failure is part of the completion.
    pub fn execute(self, client: &dyn SessionClient) -> Completion {
        match self {
            Work::FetchSession { ticket, session_id } => {
                let result = client.fetch_session(&session_id);
                Completion::Session {
                    ticket,
                    session_id,
                    result,
                }
            }
            Work::FetchLiveness {
                ticket,
                workspace_id,
            } => {
                let result = client.fetch_liveness(&workspace_id);
                Completion::Liveness {
                    ticket,
                    workspace_id,
                    result,
                }
            }
            Work::FetchNewestSession {
                ticket,
                workspace_id,
            } => {
                let result = client.fetch_newest_session(&workspace_id);
                Completion::NewestSession {
                    ticket,
                    workspace_id,
                    result,
                }
            }
            Work::SendMessage {
                ticket,
                workspace_id,
                text,
                session_id,
            } => {
                let result = client.send_message(&workspace_id, &text, session_id.as_deref());
                Completion::Send {
                    ticket,
                    workspace_id,
                    text,
                    session_id,
                    result,
                }
            }
            Work::SetDialog {
                ticket,
                workspace_id,
                action,
            } => {
                let result = client.set_dialog_open(&workspace_id, action);
                Completion::Dialog {
                    ticket,
                    workspace_id,
                    action,
                    result,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Session {
        ticket: Ticket,
        session_id: String,
        result: Result<SessionSnapshot, RemoteError>,
    },
    Liveness {
        ticket: Ticket,
        workspace_id: String,
        result: Result<StatusPayload, RemoteError>,
    },
    NewestSession {
        ticket: Ticket,
        workspace_id: String,
        result: Result<Option<NewestSession>, RemoteError>,
    },
    Send {
        ticket: Ticket,
        workspace_id: String,
        text: String,
        session_id: Option<String>,
        result: Result<SendReceipt, RemoteError>,
    },
    Dialog {
        ticket: Ticket,
        workspace_id: String,
        action: DialogAction,
        result: Result<DialogResult, RemoteError>,
    },
}

impl Completion {
    pub fn ticket(&self) -> Ticket {
        match self {
            Completion::Session { ticket, .. }
            | Completion::Liveness { ticket, .. }
            | Completion::NewestSession { ticket, .. }
            | Completion::Send { ticket, .. }
            | Completion::Dialog { ticket, .. } => *ticket,
        }
    }

    pub fn is_ok(&self) -> bool {
        match self {
            Completion::Session { result, .. } => result.is_ok(),
            Completion::Liveness { result, .. } => result.is_ok(),
            Completion::NewestSession { result, .. } => result.is_ok(),
            Completion::Send { result, .. } => result.is_ok(),
            Completion::Dialog { result, .. } => result.is_ok(),
        }
    }
}
