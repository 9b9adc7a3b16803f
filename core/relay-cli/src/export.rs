//! `relay export`: download a session to a file.
//!
//! Exports can contain sensitive content, so the first export asks for
//! confirmation unless the user opted out within the last year.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use chrono::Utc;
use relay_core::preferences::{suppress_export_warning_ttl, SUPPRESS_EXPORT_WARNING};
use relay_core::{
    default_filename, export_session, export_warning_suppressed, ExportFormat, HttpSessionClient,
    PreferenceStore, RelayConfig, RelayError,
};
use tracing::info;

use crate::CliError;

pub struct Options {
    pub out: Option<PathBuf>,
    pub confirmed: bool,
    pub dont_warn_again: bool,
}

const WARNING: &str = "Exported sessions may contain sensitive information such as \
API keys, credentials or private code. Review the file before sharing it.";

pub fn run(
    config: &RelayConfig,
    session_id: &str,
    format: ExportFormat,
    options: Options,
) -> Result<(), CliError> {
    let now = Utc::now();
    let preferences_path = config.preferences_path()?;
    let mut preferences = PreferenceStore::load(&preferences_path)?;

    if !options.confirmed && !export_warning_suppressed(&preferences, now) && !confirm()? {
        return Err(CliError::Aborted);
    }
    if options.dont_warn_again {
        preferences.set_bool(
            SUPPRESS_EXPORT_WARNING,
            true,
            suppress_export_warning_ttl(),
            now,
        );
        preferences.save(now)?;
    }

    let client = HttpSessionClient::new(&config.remote);
    let bytes = export_session(&client, session_id, format)?;
    let path = options
        .out
        .unwrap_or_else(|| PathBuf::from(default_filename(session_id, format)));
    fs_err::write(&path, &bytes)
        .map_err(|err| RelayError::io(format!("writing {}", path.display()), err))?;

    info!(
        session_id = %session_id,
        path = %path.display(),
        mime = format.mime_type(),
        "Export written"
    );
    println!("exported {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn confirm() -> Result<bool, CliError> {
    eprintln!("{}", WARNING);
    eprint!("Continue? [y/N] ");
    std::io::stderr().flush().ok();

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|err| RelayError::io("reading confirmation", err))?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
