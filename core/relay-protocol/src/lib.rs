//! Wire types and path contract for the session relay remote API.
//!
//! This crate is shared by the HTTP client and its test fakes to prevent schema
//! drift. The remote application remains the authority on session content; the
//! types here only describe what crosses the wire.

use serde::{Deserialize, Serialize};

/// Status returned by `POST /send-message` when the remote is not ready
/// (no active session in the IDE, window not focused, ...).
pub const STATUS_NOT_READY: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
/// Status returned when the client speaks a retired contract version.
pub const STATUS_DEPRECATED: u16 = 410;

pub const MAX_IDENTIFIER_LEN: usize = 128;

// ─────────────────────────────────────────────────────────────────────────────
// Paths
// ─────────────────────────────────────────────────────────────────────────────

pub mod paths {
    use super::ExportFormat;

    pub const SESSIONS: &str = "/sessions";
    pub const STATUS: &str = "/status";
    pub const LATEST_SESSION: &str = "/latest-session";
    pub const SEND_MESSAGE: &str = "/send-message";
    pub const DIALOG_TOGGLE: &str = "/dialog/toggle";

    pub fn session(session_id: &str) -> String {
        format!("/session/{}", session_id)
    }

    pub fn session_export(session_id: &str, format: ExportFormat) -> String {
        format!("/session/{}/export?format={}", session_id, format.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages and sessions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One chat turn. `content` is null for turns the remote could not render
/// (tool-only bubbles, attachments).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProjectPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "rootPath")]
    pub root_path: Option<String>,
}

/// Body of `GET /session/{id}`.
///
/// `messages` stays optional on purpose: an absent list and an empty list are
/// different signals for change detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionPayload {
    pub session_id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub messages: Option<Vec<WireMessage>>,
    #[serde(default)]
    pub project: Option<ProjectPayload>,
    /// Creation time in epoch seconds. The remote derives it from a
    /// millisecond timestamp, so fractional values occur.
    #[serde(default)]
    pub date: Option<f64>,
}

/// Entry of `GET /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummaryPayload {
    pub session_id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub project: Option<ProjectPayload>,
    #[serde(default)]
    pub date: Option<f64>,
    #[serde(default)]
    pub messages: Option<Vec<WireMessage>>,
}

/// Body of `GET /latest-session?workspace_id=`. Both fields are absent when
/// the workspace has no session yet.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LatestSessionPayload {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<WireMessage>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Liveness and dialog
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `GET /status?workspace_id=`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StatusPayload {
    #[serde(default, rename = "isActive")]
    pub is_active: bool,
    #[serde(default, rename = "isDialogOpen")]
    pub is_dialog_open: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DialogAction {
    Open,
    Close,
    Toggle,
}

impl DialogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogAction::Open => "open",
            DialogAction::Close => "close",
            DialogAction::Toggle => "toggle",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogToggleRequest {
    pub workspace_id: String,
    /// Absent means toggle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<DialogAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DialogToggleResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DialogToggleResponse {
    /// The remote reports either `message` or `error`; callers only need one line.
    pub fn summary(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sending
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub message: String,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Error body used by the remote for non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorPayload {
    #[serde(default)]
    pub error: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Export
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Html,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Html => "html",
            ExportFormat::Json => "json",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Html => "text/html;charset=utf-8",
            ExportFormat::Json => "application/json;charset=utf-8",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "html" => Some(ExportFormat::Html),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIdentifier {
    pub field: &'static str,
    pub reason: &'static str,
}

/// Session and workspace ids are opaque, but they are spliced into URL paths
/// and query strings, so anything that would change the URL shape is refused.
pub fn validate_identifier(value: &str, field: &'static str) -> Result<(), InvalidIdentifier> {
    if value.trim().is_empty() {
        return Err(InvalidIdentifier {
            field,
            reason: "must not be empty",
        });
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(InvalidIdentifier {
            field,
            reason: "must be 128 characters or fewer",
        });
    }
    if value
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#' | '&' | '%'))
    {
        return Err(InvalidIdentifier {
            field,
            reason: "contains characters that are not allowed in a URL segment",
        });
    }
    // "undefined"/"null" leak out of the remote's own UI when it loses state.
    if matches!(value, "undefined" | "null" | "new") {
        return Err(InvalidIdentifier {
            field,
            reason: "is a placeholder, not an identifier",
        });
    }
    Ok(())
}
