//! Interactive session view.
//!
//! Single-threaded cooperative loop: run whatever the engine says is due, print
//! what changed, then wait for typed input until the next deadline. A helper
//! thread only forwards stdin lines over a channel.
//!
//! ## Input
//!
//! - `/refresh`: fetch the session now
//! - `/dialog`, `/open`, `/close`: change the remote dialog
//! - `/new <text>`: start a new session with `<text>`
//! - `/quit`: leave
//! - anything else is sent to the current session

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use relay_core::{
    DialogAction, HttpSessionClient, RelayConfig, RelayError, SessionClient, SyncEngine,
    SyncTarget, Work,
};
use tracing::{debug, info};

use crate::render::Transcript;
use crate::CliError;

const IDLE_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Refresh,
    Dialog(DialogAction),
    CreateAndSend(String),
    Send(String),
    Quit,
    Unknown(String),
    Blank,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Send(line.to_string());
    };
    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    match name {
        "refresh" | "r" => Input::Refresh,
        "dialog" => Input::Dialog(DialogAction::Toggle),
        "open" => Input::Dialog(DialogAction::Open),
        "close" => Input::Dialog(DialogAction::Close),
        "new" if !rest.trim().is_empty() => Input::CreateAndSend(rest.trim().to_string()),
        "quit" | "exit" | "q" => Input::Quit,
        other => Input::Unknown(other.to_string()),
    }
}

pub fn run(config: &RelayConfig, target: SyncTarget) -> Result<(), CliError> {
    let client = HttpSessionClient::new(&config.remote);
    let mut engine = SyncEngine::new(config);
    engine.start(target, Utc::now())?;
    info!(remote = %client.base_url(), "Watching");

    let input = spawn_stdin_reader();
    let mut stdin_open = true;
    let mut transcript = Transcript::default();

    loop {
        for work in engine.poll(Utc::now()) {
            perform(&mut engine, &client, work);
        }
        let events = engine.drain_events();
        transcript.show(&engine, &events);

        let wait = engine
            .next_deadline()
            .map(|deadline| (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(IDLE_WAIT);

        if !stdin_open {
            thread::sleep(wait);
            continue;
        }
        let line = match input.recv_timeout(wait) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("stdin closed, watching without input");
                stdin_open = false;
                continue;
            }
        };

        let intent = match parse_input(&line) {
            Input::Quit => break,
            Input::Blank => continue,
            Input::Unknown(name) => {
                eprintln!("! unknown command /{}", name);
                continue;
            }
            Input::Refresh => engine.manual_refresh(Utc::now()),
            Input::Dialog(action) => engine.set_dialog(action).map(Some),
            Input::Send(text) => engine.send_message(&text).map(Some),
            Input::CreateAndSend(text) => engine.create_and_send(&text).map(Some),
        };
        match intent {
            Ok(Some(work)) => perform(&mut engine, &client, work),
            Ok(None) => {}
            Err(err) => report_refusal(&err),
        }
        let events = engine.drain_events();
        transcript.show(&engine, &events);
    }

    engine.stop();
    Ok(())
}

fn perform(engine: &mut SyncEngine, client: &dyn SessionClient, work: Work) {
    let completion = work.execute(client);
    engine.complete(completion, Utc::now());
}

fn report_refusal(err: &RelayError) {
    debug!(error = %err, "Intent refused");
    eprintln!("! {}", err.user_message());
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if sender.send(line).is_err() {
                break;
            }
        }
    });
    receiver
}
