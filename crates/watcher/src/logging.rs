//! Per-thread log targets.
//!
//! Each actor thread (and the host thread, for the "main" log) owns a
//! `tracing::Dispatch` it installs as its thread default. Log commands
//! rebuild the dispatch against a new target; disabling swaps in the no-op
//! dispatch. Reconfiguration is serialised through the command channel of
//! the thread whose log is changing, so no locking is needed around the
//! writer beyond what `tracing_subscriber` requires.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Dispatch;

/// Where a thread's log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LogTarget {
    Disabled,
    Stderr,
    Stdout,
    File(PathBuf),
}

/// Build a dispatch writing to `target`. File targets append and are
/// created if missing.
pub(crate) fn build_dispatch(target: &LogTarget) -> io::Result<Dispatch> {
    let dispatch = match target {
        LogTarget::Disabled => Dispatch::none(),
        LogTarget::Stderr => tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(io::stderr)
            .finish()
            .into(),
        LogTarget::Stdout => tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(io::stdout)
            .finish()
            .into(),
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::TRACE)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish()
                .into()
        }
    };
    Ok(dispatch)
}
