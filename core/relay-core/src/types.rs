//! Domain types committed by the engine and read by the presentation layer.

use chrono::{DateTime, Utc};
use relay_protocol::{
    LatestSessionPayload, ProjectPayload, SessionPayload, SessionSummaryPayload, StatusPayload,
    WireMessage,
};
use serde::Serialize;

use crate::error::RemoteError;
use crate::fingerprint::Fingerprint;

pub use relay_protocol::{DialogAction, ExportFormat, Role};

/// One chat turn. Order inside a session is chronological and significant.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
        }
    }

    pub fn is_user_text(&self, text: &str) -> bool {
        self.role == Role::User && self.content.as_deref() == Some(text)
    }
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        Self {
            role: wire.role,
            content: wire.content,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectInfo {
    pub name: Option<String>,
    pub root_path: Option<String>,
}

impl From<ProjectPayload> for ProjectInfo {
    fn from(payload: ProjectPayload) -> Self {
        Self {
            name: payload.name,
            root_path: payload.root_path,
        }
    }
}

/// The committed copy of a remote session.
///
/// Replaced wholesale on every confirmed change, never edited in place.
/// `fingerprint` is computed once at construction from the messages exactly as
/// they arrived, so an absent list and an empty list stay distinguishable.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub id: String,
    pub workspace_id: String,
    pub messages: Vec<Message>,
    pub project: Option<ProjectInfo>,
    /// Epoch seconds.
    pub created_at: Option<i64>,
    pub fingerprint: Fingerprint,
}

impl SessionSnapshot {
    pub fn from_parts(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        messages: Option<Vec<Message>>,
    ) -> Self {
        let fingerprint = Fingerprint::of(messages.as_deref());
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            messages: messages.unwrap_or_default(),
            project: None,
            created_at: None,
            fingerprint,
        }
    }

    pub fn with_project(mut self, project: ProjectInfo) -> Self {
        self.project = Some(project);
        self
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }
}

impl From<SessionPayload> for SessionSnapshot {
    fn from(payload: SessionPayload) -> Self {
        let messages = payload
            .messages
            .map(|list| list.into_iter().map(Message::from).collect::<Vec<_>>());
        let mut snapshot =
            SessionSnapshot::from_parts(payload.session_id, payload.workspace_id, messages);
        snapshot.project = payload.project.map(ProjectInfo::from);
        snapshot.created_at = payload.date.map(|secs| secs.floor() as i64);
        snapshot
    }
}

/// Lightweight result of "newest session for workspace": just enough to match
/// a sent message against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewestSession {
    pub id: String,
    pub messages: Vec<Message>,
}

impl NewestSession {
    pub fn contains_user_text(&self, text: &str) -> bool {
        self.messages.iter().any(|m| m.is_user_text(text))
    }

    pub(crate) fn from_payload(payload: LatestSessionPayload) -> Option<Self> {
        let id = payload.session_id.filter(|id| !id.trim().is_empty())?;
        Some(Self {
            id,
            messages: payload
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(Message::from)
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub workspace_id: String,
    pub project_name: Option<String>,
    pub created_at: Option<i64>,
    pub message_count: usize,
}

impl From<SessionSummaryPayload> for SessionSummary {
    fn from(payload: SessionSummaryPayload) -> Self {
        Self {
            id: payload.session_id,
            workspace_id: payload.workspace_id,
            project_name: payload.project.and_then(|p| p.name),
            created_at: payload.date.map(|secs| secs.floor() as i64),
            message_count: payload.messages.map(|m| m.len()).unwrap_or(0),
        }
    }
}

/// Remote liveness as last observed by the status loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessState {
    pub remote_active: bool,
    pub dialog_open: bool,
    pub last_checked_at: DateTime<Utc>,
    /// Set when this state was committed because the check failed.
    pub error: Option<RemoteError>,
}

impl LivenessState {
    pub fn observed(payload: StatusPayload, now: DateTime<Utc>) -> Self {
        Self {
            remote_active: payload.is_active,
            dialog_open: payload.is_dialog_open,
            last_checked_at: now,
            error: None,
        }
    }

    /// A failed check reads as "assume unavailable", never as the last good value.
    pub fn degraded(error: RemoteError, now: DateTime<Utc>) -> Self {
        Self {
            remote_active: false,
            dialog_open: false,
            last_checked_at: now,
            error: Some(error),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome of an accepted or refused `send-message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub accepted: bool,
    pub new_session_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogResult {
    pub success: bool,
    pub message: String,
}
