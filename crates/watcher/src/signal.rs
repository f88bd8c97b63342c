//! The bridge that wakes the host thread when a backend produces output.

use std::sync::Arc;
use tokio::sync::Notify;

/// Raised by the worker and polling threads whenever they enqueue outbound
/// messages. Implementations must be thread-safe; raises are expected to
/// coalesce, so N raises produce at least one and at most N host wakeups.
pub trait HostSignal: Send + Sync + 'static {
    fn raise(&self);
}

/// The default bridge for async hosts, backed by [`tokio::sync::Notify`].
///
/// `Notify` stores a single permit, so raises between two waits collapse
/// into one wakeup. A host drives the hub with:
///
/// ```no_run
/// # async fn demo(signal: filewatch::EventSignal, mut hub: filewatch::Hub) {
/// loop {
///     signal.wait().await;
///     hub.handle_events();
/// }
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventSignal {
    notify: Arc<Notify>,
}

impl EventSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete once at least one raise has happened since the last wait.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

impl HostSignal for EventSignal {
    fn raise(&self) {
        self.notify.notify_one();
    }
}
