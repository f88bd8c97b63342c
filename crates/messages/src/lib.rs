//! Shared types for communication between the filewatch actor threads.
//!
//! This crate provides:
//! - [`ChannelId`] and [`CommandId`] identifiers allocated by the hub
//! - [`FileSystemPayload`], [`CommandPayload`] and [`AckPayload`] carried in
//!   the [`Message`] envelope
//! - [`MessageQueue`], the mutex-guarded swap-drain buffer the threads
//!   exchange messages through
//! - [`Status`] snapshots filled by `collect_status` at every level
//!
//! Messages are move-only: ownership transfers across thread boundaries via
//! queue handoff, never by copying or serialization. The serde derives exist
//! for hosts that want to render payloads (the CLI's `--json` mode).

mod event;
mod ids;
mod message;
mod queue;
mod status;

pub use event::{kinds_are_different, EntryKind, FileSystemAction, FileSystemPayload};
pub use ids::{ChannelId, CommandId, NULL_CHANNEL_ID, NULL_COMMAND_ID};
pub use message::{AckPayload, CommandAction, CommandPayload, Message};
pub use queue::{Drained, MessageQueue, QueueClosed};
pub use status::{Status, ThreadState, ThreadStatus};
