//! Blocking HTTP implementation of [`SessionClient`].
//!
//! Status contract (see `relay_protocol`):
//! - 404 → `NotFound`
//! - 400 → `Rejected` (remote precondition unmet)
//! - 410 → `Deprecated`
//! - anything else non-2xx, connection failures and timeouts → `Transport`

use std::io::Read;
use std::time::Duration;

use relay_protocol::{
    paths, validate_identifier, DialogToggleRequest, DialogToggleResponse, ErrorPayload,
    LatestSessionPayload, SendMessageRequest, SendMessageResponse, SessionPayload,
    SessionSummaryPayload, StatusPayload, STATUS_DEPRECATED, STATUS_NOT_FOUND, STATUS_NOT_READY,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::SessionClient;
use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::types::{
    DialogAction, DialogResult, ExportFormat, NewestSession, SendReceipt, SessionSnapshot,
    SessionSummary,
};

const MAX_EXPORT_BYTES: u64 = 64 * 1024 * 1024;
const USER_AGENT: &str = concat!("session-relay/", env!("CARGO_PKG_VERSION"));

pub struct HttpSessionClient {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpSessionClient {
    pub fn new(config: &RemoteConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /sessions`: every session the remote knows about.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, RemoteError> {
        let context = format!("GET {}", paths::SESSIONS);
        let response = self.call(self.agent.get(&self.url(paths::SESSIONS)), &context, None)?;
        let payload: Vec<SessionSummaryPayload> = read_json(response, &context)?;
        Ok(payload.into_iter().map(SessionSummary::from).collect())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn call(
        &self,
        request: ureq::Request,
        context: &str,
        subject: Option<&str>,
    ) -> Result<ureq::Response, RemoteError> {
        debug!(request = %context, "Remote request");
        finish(request.call(), context, subject)
    }
}

impl SessionClient for HttpSessionClient {
    fn fetch_session(&self, session_id: &str) -> Result<SessionSnapshot, RemoteError> {
        check_identifier(session_id, "session_id")?;
        let path = paths::session(session_id);
        let context = format!("GET {}", path);
        let response = self.call(self.agent.get(&self.url(&path)), &context, Some(session_id))?;
        let payload: SessionPayload = read_json(response, &context)?;
        Ok(SessionSnapshot::from(payload))
    }

    fn fetch_liveness(&self, workspace_id: &str) -> Result<StatusPayload, RemoteError> {
        check_identifier(workspace_id, "workspace_id")?;
        let context = format!("GET {}", paths::STATUS);
        let request = self
            .agent
            .get(&self.url(paths::STATUS))
            .query("workspace_id", workspace_id);
        let response = self.call(request, &context, None)?;
        read_json(response, &context)
    }

    fn fetch_newest_session(
        &self,
        workspace_id: &str,
    ) -> Result<Option<NewestSession>, RemoteError> {
        check_identifier(workspace_id, "workspace_id")?;
        let context = format!("GET {}", paths::LATEST_SESSION);
        let request = self
            .agent
            .get(&self.url(paths::LATEST_SESSION))
            .query("workspace_id", workspace_id);
        let response = match self.call(request, &context, None) {
            Ok(response) => response,
            // No session yet in this workspace.
            Err(RemoteError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let payload: LatestSessionPayload = read_json(response, &context)?;
        Ok(NewestSession::from_payload(payload))
    }

    fn send_message(
        &self,
        workspace_id: &str,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<SendReceipt, RemoteError> {
        check_identifier(workspace_id, "workspace_id")?;
        if let Some(session_id) = session_id {
            check_identifier(session_id, "session_id")?;
        }
        let context = format!("POST {}", paths::SEND_MESSAGE);
        let body = SendMessageRequest {
            message: text.to_string(),
            workspace_id: workspace_id.to_string(),
            session_id: session_id.map(str::to_string),
        };
        debug!(request = %context, workspace_id = %workspace_id, "Remote request");
        let result = self
            .agent
            .post(&self.url(paths::SEND_MESSAGE))
            .send_json(&body);
        let response = finish(result, &context, session_id)?;
        let payload: SendMessageResponse = read_json(response, &context)?;
        Ok(SendReceipt {
            accepted: payload.success,
            new_session_id: payload.session_id.filter(|id| !id.trim().is_empty()),
            error: payload.error,
        })
    }

    fn set_dialog_open(
        &self,
        workspace_id: &str,
        action: DialogAction,
    ) -> Result<DialogResult, RemoteError> {
        check_identifier(workspace_id, "workspace_id")?;
        let context = format!("POST {}", paths::DIALOG_TOGGLE);
        let body = DialogToggleRequest {
            workspace_id: workspace_id.to_string(),
            action: match action {
                DialogAction::Toggle => None,
                other => Some(other),
            },
        };
        debug!(request = %context, action = action.as_str(), "Remote request");
        let result = self
            .agent
            .post(&self.url(paths::DIALOG_TOGGLE))
            .send_json(&body);
        let response = finish(result, &context, None)?;
        let payload: DialogToggleResponse = read_json(response, &context)?;
        Ok(DialogResult {
            success: payload.success,
            message: payload.summary(),
        })
    }

    fn export_session(
        &self,
        session_id: &str,
        format: ExportFormat,
    ) -> Result<Vec<u8>, RemoteError> {
        check_identifier(session_id, "session_id")?;
        let path = paths::session_export(session_id, format);
        let context = format!("GET {}", path);
        let response = self.call(self.agent.get(&self.url(&path)), &context, Some(session_id))?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_EXPORT_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|err| RemoteError::transport(context, err))?;
        Ok(bytes)
    }
}

fn check_identifier(value: &str, field: &'static str) -> Result<(), RemoteError> {
    validate_identifier(value, field).map_err(|err| RemoteError::InvalidIdentifier {
        field: err.field,
        reason: err.reason,
    })
}

fn finish(
    result: Result<ureq::Response, ureq::Error>,
    context: &str,
    subject: Option<&str>,
) -> Result<ureq::Response, RemoteError> {
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(status, response)) => {
            let detail = response
                .into_json::<ErrorPayload>()
                .ok()
                .and_then(|payload| payload.error);
            Err(classify_status(status, detail, context, subject))
        }
        Err(ureq::Error::Transport(transport)) => {
            Err(RemoteError::transport(context, transport))
        }
    }
}

/// Maps a non-2xx status to the error taxonomy.
pub(crate) fn classify_status(
    status: u16,
    detail: Option<String>,
    context: &str,
    subject: Option<&str>,
) -> RemoteError {
    match status {
        STATUS_NOT_FOUND => RemoteError::NotFound(
            subject
                .map(str::to_string)
                .or(detail)
                .unwrap_or_else(|| context.to_string()),
        ),
        STATUS_NOT_READY => {
            RemoteError::Rejected(detail.unwrap_or_else(|| "remote not ready".to_string()))
        }
        STATUS_DEPRECATED => RemoteError::Deprecated,
        other => {
            let details = match detail {
                Some(detail) => format!("HTTP {}: {}", other, detail),
                None => format!("HTTP {}", other),
            };
            RemoteError::Transport {
                context: context.to_string(),
                details,
            }
        }
    }
}

fn read_json<T: DeserializeOwned>(response: ureq::Response, context: &str) -> Result<T, RemoteError> {
    response
        .into_json::<T>()
        .map_err(|err| RemoteError::invalid_response(context, err))
}
