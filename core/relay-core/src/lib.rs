//! # relay-core
//!
//! Live-synchronization engine for conversational sessions owned by a remote
//! service. It keeps a local copy of one session current by polling, detects
//! changes by fingerprinting the message list, and adapts how often it polls
//! to recent activity.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. The engine is sans-IO and
//!   driven by a caller that runs remote calls and passes `now` in.
//! - **Deterministic time**: Every scheduling decision takes a `DateTime<Utc>`,
//!   so tests advance virtual time instead of sleeping.
//! - **Graceful degradation**: Failed polls degrade committed state and raise an
//!   alert; they never stop a loop.
//! - **Single-shot remote calls**: Retry policy lives in the loops, never in the
//!   client.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relay_core::{HttpSessionClient, RelayConfig, SyncEngine, SyncTarget};
//!
//! let config = RelayConfig::load(None)?;
//! let client = HttpSessionClient::new(&config.remote);
//! let mut engine = SyncEngine::new(&config);
//! engine.start(SyncTarget::session("a1b2c3"), chrono::Utc::now())?;
//! loop {
//!     engine.run_due(&client, chrono::Utc::now());
//!     for event in engine.drain_events() { /* render */ }
//! }
//! ```

pub mod cadence;
pub mod client;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod poll_loop;
pub mod preferences;
pub mod resolution;
pub mod status;
pub mod types;
pub mod work;

pub use cadence::{CadenceController, CadenceShift, CadenceState, Pace};
pub use client::{HttpSessionClient, SessionClient};
pub use config::{
    default_config_path, CadenceConfig, RelayConfig, RemoteConfig, ResolutionConfig,
    StorageConfig,
};
pub use engine::{Alert, EngineEvent, SyncEngine, SyncTarget};
pub use error::{AlertKind, RelayError, RemoteError, Result};
pub use export::{default_filename, export_session};
pub use fingerprint::Fingerprint;
pub use poll_loop::Ticket;
pub use preferences::{export_warning_suppressed, PreferenceStore};
pub use resolution::PendingSend;
pub use types::*;
pub use work::{Completion, Work};
