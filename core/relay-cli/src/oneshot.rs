//! One-shot commands: send, status, dialog, list.

use std::thread;

use chrono::Utc;
use relay_core::{
    AlertKind, DialogAction, EngineEvent, HttpSessionClient, LivenessState, RelayConfig,
    SessionClient, SyncEngine, SyncTarget, Work,
};
use tracing::info;

use crate::render::format_liveness;
use crate::CliError;

/// Sends `text` and, when the remote creates a session without reporting its
/// id, waits for resolution before returning.
pub fn send(
    config: &RelayConfig,
    workspace_id: &str,
    session_id: Option<String>,
    text: &str,
) -> Result<(), CliError> {
    let client = HttpSessionClient::new(&config.remote);
    let mut engine = SyncEngine::new(config);
    let target = match session_id {
        Some(session_id) => SyncTarget::Session {
            session_id,
            workspace_id: Some(workspace_id.to_string()),
        },
        None => SyncTarget::workspace(workspace_id),
    };
    let creates_session = target.session_id().is_none();
    engine.start(target, Utc::now())?;

    let work = if creates_session {
        engine.create_and_send(text)?
    } else {
        engine.send_message(text)?
    };
    let completion = work.execute(&client);
    engine.complete(completion, Utc::now());
    check_alerts(engine.drain_events())?;

    while engine.pending_send().is_some() {
        if let Some(deadline) = engine.next_deadline() {
            if let Ok(wait) = (deadline - Utc::now()).to_std() {
                thread::sleep(wait);
            }
        }
        for work in engine.poll(Utc::now()) {
            // Only the resolver matters here; the other loops are left idle.
            if matches!(work, Work::FetchNewestSession { .. }) {
                let completion = work.execute(&client);
                engine.complete(completion, Utc::now());
            }
        }
        check_alerts(engine.drain_events())?;
    }

    match engine.session_id() {
        Some(session_id) => println!("sent · session {}", session_id),
        None => println!("sent"),
    }
    engine.stop();
    Ok(())
}

fn check_alerts(events: Vec<EngineEvent>) -> Result<(), CliError> {
    for event in events {
        if let EngineEvent::Alert(alert) = event {
            return Err(CliError::Alert {
                message: alert.message,
                detail: alert.detail,
            });
        }
    }
    Ok(())
}

pub fn status(config: &RelayConfig, workspace_id: &str) -> Result<(), CliError> {
    let client = HttpSessionClient::new(&config.remote);
    let payload = client.fetch_liveness(workspace_id)?;
    let state = LivenessState::observed(payload, Utc::now());
    println!("{}", format_liveness(&state));
    Ok(())
}

pub fn dialog(
    config: &RelayConfig,
    workspace_id: &str,
    action: DialogAction,
) -> Result<(), CliError> {
    let client = HttpSessionClient::new(&config.remote);
    let result = client.set_dialog_open(workspace_id, action)?;
    if !result.success {
        return Err(CliError::Alert {
            message: AlertKind::Dialog.user_message().to_string(),
            detail: result.message,
        });
    }
    info!(action = action.as_str(), "Dialog changed");
    println!("{}", result.message);
    Ok(())
}

pub fn list(config: &RelayConfig) -> Result<(), CliError> {
    let client = HttpSessionClient::new(&config.remote);
    let sessions = client.list_sessions()?;
    if sessions.is_empty() {
        println!("no sessions");
        return Ok(());
    }
    for session in sessions {
        let created = session
            .created_at
            .and_then(|secs| chrono::DateTime::<Utc>::from_timestamp(secs, 0))
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {:>4} msgs  {}  {}",
            session.id,
            created,
            session.message_count,
            session.workspace_id,
            session.project_name.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
