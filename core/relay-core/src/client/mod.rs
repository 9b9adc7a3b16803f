//! Remote session client.
//!
//! Pure request/response: every method is one request, no retries and no
//! state. Retry policy lives in the loops that call it.

mod http;

pub use http::HttpSessionClient;

use relay_protocol::StatusPayload;

use crate::error::RemoteError;
use crate::types::{
    DialogAction, DialogResult, ExportFormat, NewestSession, SendReceipt, SessionSnapshot,
};

pub trait SessionClient {
    /// `GET /session/{id}`. Fails with `NotFound` when the session is gone.
    fn fetch_session(&self, session_id: &str) -> Result<SessionSnapshot, RemoteError>;

    /// `GET /status?workspace_id=`.
    fn fetch_liveness(&self, workspace_id: &str) -> Result<StatusPayload, RemoteError>;

    /// `GET /latest-session?workspace_id=`. `None` when the workspace has no
    /// session yet.
    fn fetch_newest_session(&self, workspace_id: &str)
        -> Result<Option<NewestSession>, RemoteError>;

    /// `POST /send-message`. Without `session_id` the remote may create a new
    /// session and assign its id later.
    fn send_message(
        &self,
        workspace_id: &str,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<SendReceipt, RemoteError>;

    /// `POST /dialog/toggle`.
    fn set_dialog_open(
        &self,
        workspace_id: &str,
        action: DialogAction,
    ) -> Result<DialogResult, RemoteError>;

    /// `GET /session/{id}/export?format=`. Returns the raw payload.
    fn export_session(&self, session_id: &str, format: ExportFormat)
        -> Result<Vec<u8>, RemoteError>;
}
