use chrono::{DateTime, Duration, Utc};
use relay_core::{
    AlertKind, CadenceConfig, DialogAction, DialogResult, EngineEvent, ExportFormat, Message,
    NewestSession, RelayConfig, RemoteError, ResolutionConfig, SendReceipt, SessionClient,
    SessionSnapshot, SyncEngine, SyncTarget, Work,
};
use relay_protocol::StatusPayload;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

/// Scripted in-memory remote. Each endpoint answers from whatever the test set
/// up last; every call is recorded.
#[derive(Default)]
struct ScriptedClient {
    sessions: RefCell<HashMap<String, Result<SessionSnapshot, RemoteError>>>,
    liveness: RefCell<Option<Result<StatusPayload, RemoteError>>>,
    newest: RefCell<VecDeque<Result<Option<NewestSession>, RemoteError>>>,
    send: RefCell<Option<Result<SendReceipt, RemoteError>>>,
    dialog: RefCell<Option<Result<DialogResult, RemoteError>>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedClient {
    fn with_session(self, id: &str, workspace: &str, messages: Vec<Message>) -> Self {
        self.set_session(id, workspace, messages);
        self
    }

    fn set_session(&self, id: &str, workspace: &str, messages: Vec<Message>) {
        self.sessions.borrow_mut().insert(
            id.to_string(),
            Ok(SessionSnapshot::from_parts(id, workspace, Some(messages))),
        );
    }

    fn set_liveness(&self, result: Result<StatusPayload, RemoteError>) {
        *self.liveness.borrow_mut() = Some(result);
    }

    fn push_newest(&self, result: Result<Option<NewestSession>, RemoteError>) {
        self.newest.borrow_mut().push_back(result);
    }

    fn set_send(&self, result: Result<SendReceipt, RemoteError>) {
        *self.send.borrow_mut() = Some(result);
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl SessionClient for ScriptedClient {
    fn fetch_session(&self, session_id: &str) -> Result<SessionSnapshot, RemoteError> {
        self.record(format!("fetch_session {session_id}"));
        self.sessions
            .borrow()
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| Err(RemoteError::NotFound(session_id.to_string())))
    }

    fn fetch_liveness(&self, workspace_id: &str) -> Result<StatusPayload, RemoteError> {
        self.record(format!("fetch_liveness {workspace_id}"));
        self.liveness
            .borrow()
            .clone()
            .unwrap_or(Ok(StatusPayload {
                is_active: true,
                is_dialog_open: false,
            }))
    }

    fn fetch_newest_session(
        &self,
        workspace_id: &str,
    ) -> Result<Option<NewestSession>, RemoteError> {
        self.record(format!("fetch_newest_session {workspace_id}"));
        self.newest.borrow_mut().pop_front().unwrap_or(Ok(None))
    }

    fn send_message(
        &self,
        workspace_id: &str,
        text: &str,
        session_id: Option<&str>,
    ) -> Result<SendReceipt, RemoteError> {
        self.record(format!(
            "send_message {workspace_id} {text} {}",
            session_id.unwrap_or("-")
        ));
        self.send.borrow().clone().unwrap_or(Ok(SendReceipt {
            accepted: true,
            new_session_id: None,
            error: None,
        }))
    }

    fn set_dialog_open(
        &self,
        workspace_id: &str,
        action: DialogAction,
    ) -> Result<DialogResult, RemoteError> {
        self.record(format!("set_dialog {workspace_id} {}", action.as_str()));
        self.dialog.borrow().clone().unwrap_or(Ok(DialogResult {
            success: true,
            message: "Dialog toggled".to_string(),
        }))
    }

    fn export_session(
        &self,
        session_id: &str,
        _format: ExportFormat,
    ) -> Result<Vec<u8>, RemoteError> {
        self.record(format!("export {session_id}"));
        Ok(Vec::new())
    }
}

fn t0() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
}

fn ms(value: i64) -> Duration {
    Duration::milliseconds(value)
}

fn session_in_workspace(session_id: &str, workspace_id: &str) -> SyncTarget {
    SyncTarget::Session {
        session_id: session_id.to_string(),
        workspace_id: Some(workspace_id.to_string()),
    }
}

/// Advances virtual time from deadline to deadline, running due work, until the
/// next deadline would pass `until`. Returns the last time that ran.
fn run_until(
    engine: &mut SyncEngine,
    client: &ScriptedClient,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> DateTime<Utc> {
    let mut now = from;
    for _ in 0..10_000 {
        engine.run_due(client, now);
        match engine.next_deadline() {
            Some(deadline) if deadline <= until => now = deadline.max(now),
            _ => return now,
        }
    }
    panic!("engine never went quiet");
}

fn committed(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::SessionCommitted { .. }))
        .count()
}

fn alerts(events: &[EngineEvent]) -> Vec<AlertKind> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Alert(alert) => Some(alert.kind),
            _ => None,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Change detection and cadence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unchanged_session_commits_exactly_once() {
    let client =
        ScriptedClient::default().with_session("s1", "w1", vec![Message::user("hi")]);
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(session_in_workspace("s1", "w1"), t0()).unwrap();

    run_until(&mut engine, &client, t0(), t0() + Duration::seconds(90));

    assert!(client.count("fetch_session") > 2);
    assert_eq!(committed(&engine.drain_events()), 1);
    assert_eq!(
        engine.session().map(|s| s.messages.clone()),
        Some(vec![Message::user("hi")])
    );
}


#[test]
fn test_unchanged_session_without_message_list_commits_once_and_decays() {
    let client = ScriptedClient::default();
    client.sessions.borrow_mut().insert(
        "s1".to_string(),
        Ok(SessionSnapshot::from_parts("s1", "w1", None)),
    );
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(session_in_workspace("s1", "w1"), t0()).unwrap();

    run_until(&mut engine, &client, t0(), t0() + Duration::seconds(120));

    assert!(client.count("fetch_session") > 2);
    assert_eq!(committed(&engine.drain_events()), 1);
    assert_eq!(engine.cadence_state().content_period_ms, 30_000);
    assert!(!engine.cadence_state().is_accelerated());
}

#[test]
fn test_confirmed_change_accelerates_until_quiet_window_passes() {
    let client =
        ScriptedClient::default().with_session("s1", "w1", vec![Message::user("hi")]);
    let config = RelayConfig::default();
    let mut engine = SyncEngine::new(&config);
    engine.start(session_in_workspace("s1", "w1"), t0()).unwrap();

    engine.run_due(&client, t0());
    assert_eq!(
        engine.cadence_state().content_period_ms,
        config.cadence.accelerated_content_ms
    );

    run_until(&mut engine, &client, t0(), t0() + ms(9_999));
    assert_eq!(engine.cadence_state().content_period_ms, 5_000);

    run_until(&mut engine, &client, t0() + ms(9_999), t0() + ms(10_000));
    assert_eq!(engine.cadence_state().content_period_ms, 30_000);
    assert!(!engine.cadence_state().is_accelerated());
}

#[test]
fn test_further_change_extends_accelerated_window() {
    let client =
        ScriptedClient::default().with_session("s1", "w1", vec![Message::user("hi")]);
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(session_in_workspace("s1", "w1"), t0()).unwrap();
    engine.run_due(&client, t0());

    // Picked up by the accelerated tick at t0 + 5s.
    client.set_session(
        "s1",
        "w1",
        vec![Message::user("hi"), Message::assistant("hello")],
    );
    run_until(&mut engine, &client, t0(), t0() + ms(14_999));
    assert_eq!(engine.cadence_state().content_period_ms, 5_000);
    assert_eq!(
        engine.cadence_state().last_change_at,
        Some(t0() + Duration::seconds(5))
    );

    run_until(&mut engine, &client, t0() + ms(14_999), t0() + ms(15_000));
    assert_eq!(engine.cadence_state().content_period_ms, 30_000);
    assert_eq!(committed(&engine.drain_events()), 2);
}

#[test]
fn test_fetch_failure_keeps_snapshot_and_loop_alive() {
    let client =
        ScriptedClient::default().with_session("s1", "w1", vec![Message::user("hi")]);
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(session_in_workspace("s1", "w1"), t0()).unwrap();
    engine.run_due(&client, t0());

    client.sessions.borrow_mut().insert(
        "s1".to_string(),
        Err(RemoteError::transport("GET /session/s1", "connection reset")),
    );
    run_until(&mut engine, &client, t0(), t0() + Duration::seconds(60));

    assert!(engine.session().is_some());
    assert!(engine.content_error().is_some());
    assert!(engine.next_deadline().is_some());
    let kinds = alerts(&engine.drain_events());
    assert_eq!(kinds, vec![AlertKind::Transport]);
}


#[test]
fn test_new_failure_kind_raises_its_own_alert() {
    let client =
        ScriptedClient::default().with_session("s1", "w1", vec![Message::user("hi")]);
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(session_in_workspace("s1", "w1"), t0()).unwrap();
    engine.run_due(&client, t0());

    client.sessions.borrow_mut().insert(
        "s1".to_string(),
        Err(RemoteError::transport("GET /session/s1", "connection reset")),
    );
    let now = run_until(&mut engine, &client, t0(), t0() + Duration::seconds(60));

    client.sessions.borrow_mut().remove("s1");
    run_until(&mut engine, &client, now, now + Duration::seconds(60));

    assert!(matches!(
        engine.content_error(),
        Some(RemoteError::NotFound(_))
    ));
    let kinds = alerts(&engine.drain_events());
    assert_eq!(kinds, vec![AlertKind::Transport, AlertKind::NotFound]);
}

#[test]
fn test_workspace_discovered_from_session_starts_status_loop() {
    let client =
        ScriptedClient::default().with_session("s1", "w9", vec![Message::user("hi")]);
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(SyncTarget::session("s1"), t0()).unwrap();

    let work = engine.poll(t0());
    assert!(matches!(work.as_slice(), [Work::FetchSession { .. }]));
    for item in work {
        engine.perform(&client, item, t0());
    }

    assert_eq!(engine.workspace_id(), Some("w9"));
    let work = engine.poll(t0());
    assert!(matches!(
        work.as_slice(),
        [Work::FetchLiveness { workspace_id, .. }] if workspace_id == "w9"
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Status loop
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_status_failure_commits_degraded_liveness() {
    let client = ScriptedClient::default();
    client.set_liveness(Ok(StatusPayload {
        is_active: true,
        is_dialog_open: true,
    }));
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(SyncTarget::workspace("w1"), t0()).unwrap();
    engine.run_due(&client, t0());
    assert!(engine.liveness().is_some_and(|l| l.remote_active && l.dialog_open));

    client.set_liveness(Err(RemoteError::transport("GET /status", "timed out")));
    run_until(&mut engine, &client, t0(), t0() + Duration::seconds(10));

    let liveness = engine.liveness().unwrap();
    assert!(!liveness.remote_active);
    assert!(!liveness.dialog_open);
    assert!(liveness.is_degraded());
    assert_eq!(client.count("fetch_liveness"), 3);

    // One banner for the transition, not one per failed tick.
    assert_eq!(alerts(&engine.drain_events()), vec![AlertKind::Transport]);
}

#[test]
fn test_dialog_change_expedites_status_check() {
    let client = ScriptedClient::default();
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(SyncTarget::workspace("w1"), t0()).unwrap();
    engine.run_due(&client, t0());

    let later = t0() + Duration::seconds(1);
    let work = engine.set_dialog(DialogAction::Open).unwrap();
    engine.perform(&client, work, later);

    assert_eq!(engine.next_deadline(), Some(later));
    assert_eq!(engine.run_due(&client, later), 1);
    assert!(engine
        .drain_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::DialogChanged { action: DialogAction::Open, .. })));
}

// ─────────────────────────────────────────────────────────────────────────────
// Sends and resolution
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_create_and_send_resolves_new_session() {
    let client = ScriptedClient::default().with_session("abc", "w1", vec![Message::user("hello")]);
    client.push_newest(Ok(None));
    client.push_newest(Ok(Some(NewestSession {
        id: "abc".to_string(),
        messages: vec![Message::user("hello")],
    })));
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(SyncTarget::workspace("w1"), t0()).unwrap();

    let work = engine.create_and_send("hello").unwrap();
    engine.perform(&client, work, t0());
    assert!(engine.pending_send().is_some());
    assert!(engine.is_sending());

    run_until(&mut engine, &client, t0(), t0() + Duration::seconds(3));

    assert_eq!(engine.session_id(), Some("abc"));
    assert!(!engine.is_sending());
    assert_eq!(client.count("fetch_newest_session"), 2);
    assert_eq!(client.count("fetch_session abc"), 1);
    assert!(engine.cadence_state().is_accelerated());
    assert!(engine
        .drain_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::SessionResolved { session_id } if session_id == "abc")));
}

#[test]
fn test_resolution_accepts_only_content_match() {
    let client = ScriptedClient::default();
    client.push_newest(Ok(Some(NewestSession {
        id: "someone-else".to_string(),
        messages: vec![Message::user("other text")],
    })));
    client.push_newest(Ok(Some(NewestSession {
        id: "echo".to_string(),
        messages: vec![Message::assistant("hello")],
    })));
    client.push_newest(Ok(Some(NewestSession {
        id: "mine".to_string(),
        messages: vec![Message::user("hello")],
    })));
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(SyncTarget::workspace("w1"), t0()).unwrap();

    let work = engine.create_and_send("hello").unwrap();
    engine.perform(&client, work, t0());
    run_until(&mut engine, &client, t0(), t0() + Duration::seconds(30));

    assert_eq!(engine.session_id(), Some("mine"));
    assert_eq!(client.count("fetch_newest_session"), 3);
}

#[test]
fn test_resolution_gives_up_within_attempt_budget() {
    let client = ScriptedClient::default();
    let resolution = ResolutionConfig::default();
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(SyncTarget::workspace("w1"), t0()).unwrap();

    let work = engine.create_and_send("hello").unwrap();
    engine.perform(&client, work, t0());

    let budget = ms(i64::from(resolution.max_attempts) * resolution.retry_delay_ms as i64);
    let mut now = t0();
    while engine.pending_send().is_some() {
        engine.run_due(&client, now);
        if let Some(deadline) = engine.next_deadline() {
            now = deadline.max(now);
        }
        assert!(now - t0() <= budget, "resolution ran past its budget");
    }

    assert_eq!(
        client.count("fetch_newest_session"),
        resolution.max_attempts as usize
    );
    assert!(!engine.is_sending());
    assert_eq!(engine.session_id(), None);
    assert_eq!(
        engine.last_alert().map(|a| a.kind),
        Some(AlertKind::ResolutionTimeout)
    );
}

#[test]
fn test_send_with_returned_id_skips_resolution() {
    let client = ScriptedClient::default().with_session("fresh", "w1", vec![Message::user("hi")]);
    client.set_send(Ok(SendReceipt {
        accepted: true,
        new_session_id: Some("fresh".to_string()),
        error: None,
    }));
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(SyncTarget::workspace("w1"), t0()).unwrap();

    let work = engine.create_and_send("hi").unwrap();
    engine.perform(&client, work, t0());

    assert_eq!(engine.session_id(), Some("fresh"));
    assert!(engine.pending_send().is_none());
    assert_eq!(client.count("fetch_newest_session"), 0);
}

#[test]
fn test_send_accelerates_both_cadences() {
    let client = ScriptedClient::default().with_session("s1", "w1", vec![Message::user("hi")]);
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(session_in_workspace("s1", "w1"), t0()).unwrap();
    run_until(&mut engine, &client, t0(), t0() + Duration::seconds(40));
    assert!(!engine.cadence_state().is_accelerated());

    let now = t0() + Duration::seconds(40);
    let work = engine.send_message("next").unwrap();
    engine.perform(&client, work, now);

    let cadence = engine.cadence_state();
    assert_eq!(cadence.content_period_ms, 5_000);
    assert_eq!(cadence.status_period_ms, 2_000);
    assert_eq!(client.count("send_message w1 next s1"), 1);
}

#[test]
fn test_rejected_send_reads_as_not_ready() {
    let client = ScriptedClient::default();
    client.set_send(Err(RemoteError::Rejected("no active composer".to_string())));
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(SyncTarget::workspace("w1"), t0()).unwrap();

    let work = engine.create_and_send("hello").unwrap();
    engine.perform(&client, work, t0());

    assert!(!engine.is_sending());
    assert_eq!(engine.last_alert().map(|a| a.kind), Some(AlertKind::NotReady));
    assert!(!engine.cadence_state().is_accelerated());
}

#[test]
fn test_deprecated_contract_is_distinct_from_transport() {
    let client = ScriptedClient::default();
    client.set_send(Err(RemoteError::Deprecated));
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(SyncTarget::workspace("w1"), t0()).unwrap();

    let work = engine.create_and_send("hello").unwrap();
    engine.perform(&client, work, t0());

    let alert = engine.last_alert().unwrap();
    assert_eq!(alert.kind, AlertKind::Deprecated);
    assert_ne!(alert.message, AlertKind::Transport.user_message());
}

#[test]
fn test_content_tick_skipped_while_send_in_flight() {
    let client = ScriptedClient::default().with_session("s1", "w1", vec![Message::user("hi")]);
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(session_in_workspace("s1", "w1"), t0()).unwrap();
    engine.run_due(&client, t0());

    let send = engine.send_message("next").unwrap();
    let due = t0() + Duration::seconds(5);
    let work = engine.poll(due);
    assert!(!work.iter().any(|w| matches!(w, Work::FetchSession { .. })));
    assert!(matches!(
        engine.manual_refresh(due),
        Err(relay_core::RelayError::Busy(_))
    ));

    engine.perform(&client, send, due);
    assert!(!engine.is_sending());
}

// ─────────────────────────────────────────────────────────────────────────────
// Overlap and stale results
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_manual_refresh_during_in_flight_tick_issues_one_fetch() {
    let client = ScriptedClient::default().with_session("s1", "w1", vec![Message::user("hi")]);
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(SyncTarget::session("s1"), t0()).unwrap();

    let work = engine.poll(t0());
    assert_eq!(work.len(), 1);
    assert!(engine.manual_refresh(t0()).unwrap().is_none());
    assert!(engine.is_refreshing());

    for item in work {
        engine.perform(&client, item, t0());
    }
    assert_eq!(client.count("fetch_session"), 1);
    assert!(!engine.is_refreshing());
}

#[test]
fn test_manual_refresh_replaces_pending_tick() {
    let client = ScriptedClient::default().with_session("s1", "w1", vec![Message::user("hi")]);
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(session_in_workspace("s1", "w1"), t0()).unwrap();
    engine.run_due(&client, t0());

    let now = t0() + Duration::seconds(2);
    let work = engine.manual_refresh(now).unwrap().expect("refresh issued");
    let later = engine.poll(now + Duration::seconds(3));
    assert!(!later.iter().any(|w| matches!(w, Work::FetchSession { .. })));
    engine.perform(&client, work, now);
    assert_eq!(client.count("fetch_session"), 2);
}


#[test]
fn test_refresh_of_replaced_session_clears_refreshing() {
    let client = ScriptedClient::default()
        .with_session("s1", "w1", vec![Message::user("hi")])
        .with_session("s2", "w1", vec![Message::user("again")]);
    client.set_send(Ok(SendReceipt {
        accepted: true,
        new_session_id: Some("s2".to_string()),
        error: None,
    }));
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(session_in_workspace("s1", "w1"), t0()).unwrap();
    engine.run_due(&client, t0());

    let now = t0() + Duration::seconds(1);
    let refresh = engine.manual_refresh(now).unwrap().expect("refresh issued");
    assert!(engine.is_refreshing());

    let send = engine.create_and_send("again").unwrap();
    engine.perform(&client, send, now);
    assert_eq!(engine.session_id(), Some("s2"));

    engine.perform(&client, refresh, now);
    assert!(!engine.is_refreshing());
    assert_eq!(engine.session_id(), Some("s2"));
}

#[test]
fn test_result_after_stop_is_discarded() {
    let client = ScriptedClient::default().with_session("s1", "w1", vec![Message::user("hi")]);
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(session_in_workspace("s1", "w1"), t0()).unwrap();

    let work = engine.poll(t0());
    engine.stop();
    for item in work {
        engine.perform(&client, item, t0());
    }

    assert!(engine.session().is_none());
    assert!(engine.liveness().is_none());
    assert!(engine.drain_events().is_empty());
    assert_eq!(engine.next_deadline(), None);
}

#[test]
fn test_result_for_previous_target_is_discarded() {
    let client = ScriptedClient::default()
        .with_session("s1", "w1", vec![Message::user("one")])
        .with_session("s2", "w1", vec![Message::user("two")]);
    let mut engine = SyncEngine::new(&RelayConfig::default());
    engine.start(SyncTarget::session("s1"), t0()).unwrap();
    let stale = engine.poll(t0());

    engine.start(SyncTarget::session("s2"), t0()).unwrap();
    for item in stale {
        engine.perform(&client, item, t0());
    }
    assert!(engine.session().is_none());

    engine.run_due(&client, t0());
    assert_eq!(engine.session().map(|s| s.id.as_str()), Some("s2"));
}

#[test]
fn test_custom_cadence_is_honoured() {
    let config = RelayConfig {
        cadence: CadenceConfig {
            baseline_content_ms: 60_000,
            accelerated_content_ms: 1_000,
            baseline_status_ms: 10_000,
            accelerated_status_ms: 1_000,
            decay_after_ms: 3_000,
        },
        ..RelayConfig::default()
    };
    let client = ScriptedClient::default().with_session("s1", "w1", vec![Message::user("hi")]);
    let mut engine = SyncEngine::new(&config);
    engine.start(session_in_workspace("s1", "w1"), t0()).unwrap();

    engine.run_due(&client, t0());
    assert_eq!(engine.cadence_state().content_period_ms, 1_000);
    run_until(&mut engine, &client, t0(), t0() + ms(3_000));
    assert_eq!(engine.cadence_state().content_period_ms, 60_000);
}
