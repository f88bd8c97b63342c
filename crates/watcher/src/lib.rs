//! filewatch — a cross-platform filesystem event watcher.
//!
//! Three actors cooperate: the host-facing [`Hub`], a worker thread driving
//! the OS-native notification backend (via the `notify` crate), and a
//! polling thread driving a budgeted stat-scan backend for filesystems
//! where native notification does not work. The host registers root paths
//! with [`Hub::watch`]; events and command acknowledgements flow back
//! through callbacks invoked by [`Hub::handle_events`], which the host
//! calls whenever the [`EventSignal`] is raised.
//!
//! # Example
//!
//! ```no_run
//! use filewatch::{EventSignal, Hub};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), filewatch::HubError> {
//! let signal = EventSignal::new();
//! let mut hub = Hub::new(Arc::new(signal.clone()))?;
//!
//! hub.watch(
//!     "/tmp/watched",
//!     false, // use the native backend
//!     Box::new(|ack| println!("subscribed: {ack}")),
//!     Box::new(|events| {
//!         for event in events {
//!             println!("{event}");
//!         }
//!     }),
//! )?;
//!
//! loop {
//!     signal.wait().await;
//!     hub.handle_events();
//! }
//! # }
//! ```
//!
//! Delivery is at-most-once: events may be dropped under backpressure, but
//! drops are always visible in the [`Status`] counters and the warn log.
//! Within one channel, events reach the sink in emission order; no ordering
//! is promised across channels or across the two backends.

mod errors;
mod hub;
mod logging;
mod polling;
mod signal;
mod thread;
mod worker;

pub use errors::{BackendError, HubError};
pub use hub::{AckCallback, EventCallback, Hub};
pub use signal::{EventSignal, HostSignal};
pub use thread::Backend;

/// The shared message contract, re-exported for hosts and custom backends.
pub use filewatch_messages as messages;

pub use filewatch_messages::{
    kinds_are_different, AckPayload, ChannelId, CommandId, EntryKind, FileSystemAction,
    FileSystemPayload, Status, ThreadState, ThreadStatus,
};
