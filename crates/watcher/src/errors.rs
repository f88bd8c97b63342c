//! Error types crossing the library boundary.

use filewatch_messages::ChannelId;
use thiserror::Error;

/// Errors reported by a backend while handling a command or polling for
/// events. Most are recoverable and surface as a failure ack; a
/// [`BackendError::Lost`] backend terminates its owning thread.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The command targeted a channel this backend does not know.
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    /// The command required a path argument but carried none.
    #[error("command is missing its path argument")]
    MissingRoot,

    /// The native watcher rejected the operation.
    #[error("{0}")]
    Watch(#[from] notify::Error),

    /// Filesystem access failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The command is not meaningful for this backend.
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    /// The backend's event source is gone; the owning thread must stop.
    #[error("event source lost: {0}")]
    Lost(String),
}

impl BackendError {
    /// Whether this error terminates the owning thread.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Lost(_))
    }
}

/// Errors returned synchronously by hub operations. Everything else reaches
/// the host through an ack on the registered ack sink.
#[derive(Debug, Error)]
pub enum HubError {
    /// The target thread has terminated; the command was not enqueued.
    #[error("the {0} thread is not running")]
    ThreadStopped(&'static str),

    /// A tunable was below its minimum.
    #[error("invalid {what}: {value} is below the minimum of {min}")]
    InvalidArgument {
        what: &'static str,
        value: u64,
        min: u64,
    },

    /// The native watcher could not be initialised.
    #[error("failed to initialise the native watcher: {0}")]
    NativeInit(#[from] notify::Error),

    /// Thread spawn or log file access failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
