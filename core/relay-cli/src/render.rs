//! Terminal rendering of engine events.

use relay_core::{EngineEvent, LivenessState, Message, Role, SessionSnapshot, SyncEngine};

/// Prints each message once. A new session starts a new transcript.
#[derive(Default)]
pub struct Transcript {
    session_id: Option<String>,
    printed: usize,
}

impl Transcript {
    pub fn show(&mut self, engine: &SyncEngine, events: &[EngineEvent]) {
        for event in events {
            match event {
                EngineEvent::SessionCommitted { .. } => {
                    if let Some(snapshot) = engine.session() {
                        self.print_new_messages(snapshot);
                    }
                }
                EngineEvent::SessionResolved { session_id } => {
                    println!("· session {}", session_id);
                }
                EngineEvent::LivenessUpdated(state) => {
                    tracing::debug!(
                        remote_active = state.remote_active,
                        dialog_open = state.dialog_open,
                        "Liveness"
                    );
                }
                EngineEvent::CadenceChanged(state) => {
                    tracing::debug!(
                        content_ms = state.content_period_ms,
                        status_ms = state.status_period_ms,
                        "Cadence"
                    );
                }
                EngineEvent::DialogChanged { message, .. } => println!("· {}", message),
                EngineEvent::SendAccepted { .. } => println!("· sent"),
                EngineEvent::Alert(alert) => eprintln!("! {} ({})", alert.message, alert.detail),
            }
        }
    }

    fn print_new_messages(&mut self, snapshot: &SessionSnapshot) {
        if self.session_id.as_deref() != Some(snapshot.id.as_str()) {
            self.session_id = Some(snapshot.id.clone());
            self.printed = 0;
            let project = snapshot
                .project
                .as_ref()
                .and_then(|p| p.name.as_deref())
                .unwrap_or("-");
            println!("── session {} · project {}", snapshot.id, project);
        }
        // The remote may rewrite history; reprint everything when it shrinks.
        if snapshot.messages.len() < self.printed {
            println!("── session {} changed, reprinting", snapshot.id);
            self.printed = 0;
        }
        for message in &snapshot.messages[self.printed..] {
            println!("{}", format_message(message));
        }
        self.printed = snapshot.messages.len();
    }
}

pub fn format_message(message: &Message) -> String {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    format!("{:>9} │ {}", who, message.content.as_deref().unwrap_or(""))
}

pub fn format_liveness(state: &LivenessState) -> String {
    let active = if state.remote_active { "active" } else { "inactive" };
    let dialog = if state.dialog_open { "open" } else { "closed" };
    format!("remote {} · dialog {}", active, dialog)
}
