//! relay: terminal client for remotely owned chat sessions.
//!
//! ## Subcommands
//!
//! - `watch`: Follow a session live; typed lines are sent, `/` lines are commands
//! - `send`: Send one message, resolving the new session id if needed
//! - `status`: Print remote liveness for a workspace
//! - `dialog`: Open, close or toggle the remote dialog
//! - `export`: Download a session as HTML or JSON
//! - `list`: List the sessions the remote knows about

mod export;
mod logging;
mod oneshot;
mod render;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use relay_core::{DialogAction, ExportFormat, RelayConfig, RelayError, RemoteError, SyncTarget};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Live view of remote chat sessions")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.session-relay/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write logs to a daily rolling file in this directory instead of stderr
    #[arg(long, global = true, value_name = "DIR")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow a session (or a workspace until its first session exists)
    Watch {
        #[arg(long)]
        session: Option<String>,

        #[arg(long)]
        workspace: Option<String>,
    },

    /// Send one message
    Send {
        #[arg(long)]
        workspace: String,

        /// Existing session; omit to start a new one
        #[arg(long)]
        session: Option<String>,

        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// Print remote liveness
    Status {
        #[arg(long)]
        workspace: String,
    },

    /// Change the remote dialog (toggles by default)
    Dialog {
        #[arg(long)]
        workspace: String,

        #[arg(long, conflicts_with = "close")]
        open: bool,

        #[arg(long)]
        close: bool,
    },

    /// Download a session
    Export {
        #[arg(value_name = "SESSION_ID")]
        session: String,

        /// html or json
        #[arg(long, default_value = "html")]
        format: String,

        /// Output file (default: session-<id prefix>.<ext>)
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,

        /// Skip the sensitive-content confirmation
        #[arg(long)]
        yes: bool,

        /// Remember to skip the confirmation for a year
        #[arg(long)]
        dont_warn_again: bool,
    },

    /// List sessions
    List,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("{message} ({detail})")]
    Alert { message: String, detail: String },

    #[error("{0}")]
    Usage(String),

    #[error("Aborted")]
    Aborted,
}

impl From<RemoteError> for CliError {
    fn from(err: RemoteError) -> Self {
        CliError::Relay(RelayError::Remote(err))
    }
}

impl CliError {
    fn user_message(&self) -> String {
        match self {
            CliError::Relay(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let config = RelayConfig::load(cli.config.as_deref());
    let log_dir = cli
        .log_file
        .clone()
        .or_else(|| config.as_ref().ok().and_then(RelayConfig::log_dir));
    let _logging_guard = logging::init(log_dir.as_deref());

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "Failed to load configuration");
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    let (name, result) = match cli.command {
        Commands::Watch { session, workspace } => {
            let result =
                watch_target(session, workspace).and_then(|target| watch::run(&config, target));
            ("watch", result)
        }
        Commands::Send {
            workspace,
            session,
            text,
        } => ("send", oneshot::send(&config, &workspace, session, &text)),
        Commands::Status { workspace } => ("status", oneshot::status(&config, &workspace)),
        Commands::Dialog {
            workspace,
            open,
            close,
        } => {
            let action = match (open, close) {
                (true, _) => DialogAction::Open,
                (_, true) => DialogAction::Close,
                _ => DialogAction::Toggle,
            };
            ("dialog", oneshot::dialog(&config, &workspace, action))
        }
        Commands::Export {
            session,
            format,
            out,
            yes,
            dont_warn_again,
        } => {
            let result = ExportFormat::parse(&format)
                .ok_or_else(|| CliError::Usage(format!("unknown export format: {}", format)))
                .and_then(|format| {
                    export::run(
                        &config,
                        &session,
                        format,
                        export::Options {
                            out,
                            confirmed: yes,
                            dont_warn_again,
                        },
                    )
                });
            ("export", result)
        }
        Commands::List => ("list", oneshot::list(&config)),
    };

    if let Err(err) = result {
        tracing::error!(command = name, error = %err, "relay command failed");
        eprintln!("error: {}", err.user_message());
        std::process::exit(1);
    }
}

fn watch_target(
    session: Option<String>,
    workspace: Option<String>,
) -> Result<SyncTarget, CliError> {
    match (session, workspace) {
        (Some(session_id), workspace_id) => Ok(SyncTarget::Session {
            session_id,
            workspace_id,
        }),
        (None, Some(workspace_id)) => Ok(SyncTarget::Workspace { workspace_id }),
        (None, None) => Err(CliError::Usage(
            "watch needs --session or --workspace".to_string(),
        )),
    }
}
