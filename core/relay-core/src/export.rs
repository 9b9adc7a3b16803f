//! Session export.

use relay_protocol::validate_identifier;
use tracing::info;

use crate::client::SessionClient;
use crate::error::{RelayError, Result};
use crate::types::ExportFormat;

/// Downloads the rendered session. A zero-length payload is an error so that
/// an empty file is never written.
pub fn export_session(
    client: &dyn SessionClient,
    session_id: &str,
    format: ExportFormat,
) -> Result<Vec<u8>> {
    validate_identifier(session_id, "session_id")?;
    let payload = client.export_session(session_id, format)?;
    if payload.is_empty() {
        return Err(RelayError::EmptyExport(session_id.to_string()));
    }
    info!(
        session_id = %session_id,
        format = format.as_str(),
        bytes = payload.len(),
        "Session exported"
    );
    Ok(payload)
}

/// `session-{first 8 chars of id}.{ext}`
pub fn default_filename(session_id: &str, format: ExportFormat) -> String {
    let short: String = session_id.chars().take(8).collect();
    format!("session-{}.{}", short, format.extension())
}
