//! Error types for relay-core operations.
//!
//! `RemoteError` is what a single remote call can fail with. `RelayError` is the
//! crate-wide type that also covers local concerns (config, preferences, export)
//! and the engine-level `ResolutionTimeout`.

use std::path::PathBuf;

use relay_protocol::InvalidIdentifier;

// ═══════════════════════════════════════════════════════════════════════════════
// Remote Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure of one remote request. Remote calls are single-shot; whether a
/// failure is retried is decided by the loop that issued the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The session does not exist. Terminal for that fetch.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Network failure, timeout or 5xx. Retried by the next scheduled tick.
    #[error("Transport error: {context}: {details}")]
    Transport { context: String, details: String },

    /// The remote refused the request because a precondition is unmet
    /// (no active session, IDE window unavailable).
    #[error("Remote not ready: {0}")]
    Rejected(String),

    /// The remote no longer supports the contract this client speaks.
    #[error("Remote API contract changed")]
    Deprecated,

    /// The response arrived but did not match the wire contract.
    #[error("Invalid response: {context}: {details}")]
    InvalidResponse { context: String, details: String },

    /// An identifier failed local validation; no request was sent.
    #[error("Invalid {field}: {reason}")]
    InvalidIdentifier {
        field: &'static str,
        reason: &'static str,
    },
}

impl RemoteError {
    pub fn transport(context: impl Into<String>, details: impl ToString) -> Self {
        RemoteError::Transport {
            context: context.into(),
            details: details.to_string(),
        }
    }

    pub fn invalid_response(context: impl Into<String>, details: impl ToString) -> Self {
        RemoteError::InvalidResponse {
            context: context.into(),
            details: details.to_string(),
        }
    }

    pub fn kind(&self) -> AlertKind {
        match self {
            RemoteError::NotFound(_) => AlertKind::NotFound,
            RemoteError::Transport { .. } | RemoteError::InvalidResponse { .. } => {
                AlertKind::Transport
            }
            RemoteError::Rejected(_) => AlertKind::NotReady,
            RemoteError::Deprecated => AlertKind::Deprecated,
            RemoteError::InvalidIdentifier { .. } => AlertKind::InvalidIdentifier,
        }
    }

    /// Text for the inline banner shown to the user.
    pub fn user_message(&self) -> String {
        self.kind().user_message().to_string()
    }
}

/// Categories the presentation layer distinguishes when showing a banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    NotFound,
    Transport,
    NotReady,
    Deprecated,
    ResolutionTimeout,
    SendFailed,
    Dialog,
    InvalidIdentifier,
}

impl AlertKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            AlertKind::NotFound => "Session not found.",
            AlertKind::Transport => {
                "Could not reach the remote service. Check that it is running."
            }
            AlertKind::NotReady => "The remote is not ready. Create a session there first.",
            AlertKind::Deprecated => "The remote API has changed. Reload the client.",
            AlertKind::ResolutionTimeout => {
                "Could not resolve the new session. Refresh and try again."
            }
            AlertKind::SendFailed => "The remote did not accept the message.",
            AlertKind::Dialog => "Could not change the remote dialog.",
            AlertKind::InvalidIdentifier => "The session or workspace id is not valid.",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Crate Error
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Session resolution gave up after {attempts} attempts")]
    ResolutionTimeout { attempts: u32 },

    #[error("Export of session {0} returned no content")]
    EmptyExport(String),

    #[error("Invalid {field}: {reason}")]
    InvalidIdentifier {
        field: &'static str,
        reason: &'static str,
    },

    #[error("Message is empty")]
    EmptyMessage,

    /// An intent was refused because the engine is not in a state to run it.
    #[error("Busy: {0}")]
    Busy(String),

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RelayError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        RelayError::Io {
            context: context.into(),
            source,
        }
    }

    /// Banner text for errors that reach the user.
    pub fn user_message(&self) -> String {
        match self {
            RelayError::Remote(err) => err.user_message(),
            RelayError::ResolutionTimeout { .. } => {
                AlertKind::ResolutionTimeout.user_message().to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<InvalidIdentifier> for RelayError {
    fn from(err: InvalidIdentifier) -> Self {
        RelayError::InvalidIdentifier {
            field: err.field,
            reason: err.reason,
        }
    }
}

/// Convenience type alias for Results using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;
