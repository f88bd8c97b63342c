//! Command and acknowledgement payloads and the message envelope.

use crate::event::FileSystemPayload;
use crate::ids::{ChannelId, CommandId, NULL_CHANNEL_ID};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The administrative actions a thread understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    /// Begin watching `root`; bind it to the channel in `arg`.
    Add,
    /// Stop watching the channel in `arg`.
    Remove,
    /// Redirect the thread log to the path in `root`.
    LogFile,
    /// Redirect the thread log to stderr.
    LogStderr,
    /// Redirect the thread log to stdout.
    LogStdout,
    /// Silence the thread log.
    LogDisable,
    /// Set the polling scan interval to `arg` milliseconds.
    PollingInterval,
    /// Set the maximum polling events per tick to `arg`.
    PollingThrottle,
    /// Flush pending backend output before acknowledging.
    Drain,
}

/// One host-to-thread request. Acknowledged exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub id: CommandId,
    pub action: CommandAction,
    /// A path whose meaning depends on the action: the root to watch for
    /// [`CommandAction::Add`], the log path for [`CommandAction::LogFile`].
    pub root: Option<PathBuf>,
    /// An integer whose meaning depends on the action: the target channel for
    /// Add/Remove, the value for the polling tunables.
    pub arg: u64,
}

impl CommandPayload {
    pub fn add(id: CommandId, root: PathBuf, channel_id: ChannelId) -> Self {
        Self {
            id,
            action: CommandAction::Add,
            root: Some(root),
            arg: channel_id,
        }
    }

    pub fn remove(id: CommandId, channel_id: ChannelId) -> Self {
        Self {
            id,
            action: CommandAction::Remove,
            root: None,
            arg: channel_id,
        }
    }

    pub fn log_file(id: CommandId, path: PathBuf) -> Self {
        Self {
            id,
            action: CommandAction::LogFile,
            root: Some(path),
            arg: 0,
        }
    }

    pub fn plain(id: CommandId, action: CommandAction) -> Self {
        Self {
            id,
            action,
            root: None,
            arg: 0,
        }
    }

    pub fn tunable(id: CommandId, action: CommandAction, value: u64) -> Self {
        Self {
            id,
            action,
            root: None,
            arg: value,
        }
    }

    /// The channel this command targets, for the actions that target one.
    pub fn channel_id(&self) -> ChannelId {
        match self.action {
            CommandAction::Add | CommandAction::Remove => self.arg,
            _ => NULL_CHANNEL_ID,
        }
    }
}

impl fmt::Display for CommandPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[command {} ", self.id)?;
        let root = || {
            self.root
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        match self.action {
            CommandAction::Add => write!(f, "add {} as channel {}", root(), self.arg)?,
            CommandAction::Remove => write!(f, "remove channel {}", self.arg)?,
            CommandAction::LogFile => write!(f, "log to file {}", root())?,
            CommandAction::LogStderr => write!(f, "log to stderr")?,
            CommandAction::LogStdout => write!(f, "log to stdout")?,
            CommandAction::LogDisable => write!(f, "disable logging")?,
            CommandAction::PollingInterval => write!(f, "polling interval {} ms", self.arg)?,
            CommandAction::PollingThrottle => write!(f, "polling throttle {}", self.arg)?,
            CommandAction::Drain => write!(f, "drain")?,
        }
        write!(f, "]")
    }
}

/// Thread-to-host reply confirming a command has taken effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckPayload {
    pub command_id: CommandId,
    /// The channel the command targeted, or [`NULL_CHANNEL_ID`].
    pub channel_id: ChannelId,
    pub success: bool,
    /// Human-readable error description; empty on success.
    pub message: String,
}

impl AckPayload {
    /// A successful ack for `command`.
    pub fn ok(command: &CommandPayload) -> Self {
        Self {
            command_id: command.id,
            channel_id: command.channel_id(),
            success: true,
            message: String::new(),
        }
    }

    /// A failure ack for `command` carrying `message`.
    pub fn err(command: &CommandPayload, message: impl Into<String>) -> Self {
        Self {
            command_id: command.id,
            channel_id: command.channel_id(),
            success: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for AckPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(f, "[ack {} ok]", self.command_id)
        } else {
            write!(f, "[ack {} failed: {}]", self.command_id, self.message)
        }
    }
}

/// The envelope moved through the inter-thread queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    FileSystem(FileSystemPayload),
    Command(CommandPayload),
    Ack(AckPayload),
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::FileSystem(p) => write!(f, "{p}"),
            Message::Command(p) => write!(f, "{p}"),
            Message::Ack(p) => write!(f, "{p}"),
        }
    }
}

impl From<FileSystemPayload> for Message {
    fn from(p: FileSystemPayload) -> Self {
        Message::FileSystem(p)
    }
}

impl From<CommandPayload> for Message {
    fn from(p: CommandPayload) -> Self {
        Message::Command(p)
    }
}

impl From<AckPayload> for Message {
    fn from(p: AckPayload) -> Self {
        Message::Ack(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_from_command() {
        let add = CommandPayload::add(9, PathBuf::from("/tmp/root"), 4);
        let ok = AckPayload::ok(&add);
        assert_eq!(ok.command_id, 9);
        assert_eq!(ok.channel_id, 4);
        assert!(ok.success);
        assert!(ok.message.is_empty());

        let err = AckPayload::err(&add, "no such directory");
        assert_eq!(err.command_id, 9);
        assert_eq!(err.channel_id, 4);
        assert!(!err.success);
        assert_eq!(err.message, "no such directory");
    }

    #[test]
    fn test_ack_channel_only_for_add_remove() {
        let log = CommandPayload::log_file(2, PathBuf::from("/tmp/log"));
        assert_eq!(AckPayload::ok(&log).channel_id, NULL_CHANNEL_ID);

        let remove = CommandPayload::remove(3, 17);
        assert_eq!(AckPayload::ok(&remove).channel_id, 17);
    }

    #[test]
    fn test_command_display() {
        let add = CommandPayload::add(1, PathBuf::from("/watched"), 2);
        assert_eq!(add.to_string(), "[command 1 add /watched as channel 2]");

        let interval = CommandPayload::tunable(5, CommandAction::PollingInterval, 250);
        assert_eq!(interval.to_string(), "[command 5 polling interval 250 ms]");
    }

    #[test]
    fn test_message_display_forwards() {
        let ack = AckPayload::err(&CommandPayload::remove(8, 1), "unknown channel");
        let msg = Message::from(ack);
        assert_eq!(msg.to_string(), "[ack 8 failed: unknown channel]");
    }
}
