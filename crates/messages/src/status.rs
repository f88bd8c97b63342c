//! Diagnostic snapshots filled by `collect_status`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an actor thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    #[default]
    Stopped,
    Running,
    Stopping,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThreadState::Stopped => "stopped",
            ThreadState::Running => "running",
            ThreadState::Stopping => "stopping",
        })
    }
}

/// Point-in-time counters for one actor thread and its backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadStatus {
    pub state: ThreadState,
    /// Commands currently buffered host-to-thread.
    pub in_size: usize,
    pub in_high_water: usize,
    /// Messages currently buffered thread-to-host.
    pub out_size: usize,
    pub out_high_water: usize,
    /// Roots the backend is currently watching.
    pub active_roots: usize,
    /// Filesystem payloads the backend has produced since start.
    pub events_emitted: u64,
}

/// Hub-level counters plus both thread snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status {
    /// Commands dispatched but not yet acknowledged.
    pub pending_callbacks: usize,
    /// Channels with a registered event sink.
    pub active_channels: usize,
    /// Events dropped because their channel was already unwatched.
    pub orphaned_events: u64,
    /// Acks dropped because their command id was unknown.
    pub unknown_acks: u64,
    pub worker: ThreadStatus,
    pub polling: ThreadStatus,
}
