//! Identifier types allocated by the hub.

/// Identifies one live subscription binding a root path to an event sink.
pub type ChannelId = u64;

/// Identifies one host-to-thread command, acknowledged exactly once.
pub type CommandId = u64;

/// Reserved channel id meaning "none". Never allocated.
pub const NULL_CHANNEL_ID: ChannelId = 0;

/// Reserved command id meaning "none". Never allocated.
pub const NULL_COMMAND_ID: CommandId = 0;
