//! Filesystem event payloads produced by the backends.

use crate::ids::ChannelId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// What kind of filesystem entry an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
    /// The backend could not determine the kind (the entry may already be
    /// gone by the time it is examined).
    Unknown,
}

/// True only when both kinds are known and unequal.
pub fn kinds_are_different(a: EntryKind, b: EntryKind) -> bool {
    a != EntryKind::Unknown && b != EntryKind::Unknown && a != b
}

/// What happened to the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSystemAction {
    Created,
    Deleted,
    Modified,
    Renamed,
}

/// One filesystem change reported on a channel.
///
/// `old_path` is present if and only if the action is [`FileSystemAction::Renamed`];
/// the constructors enforce this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemPayload {
    pub channel_id: ChannelId,
    pub action: FileSystemAction,
    pub entry_kind: EntryKind,
    pub old_path: Option<PathBuf>,
    pub path: PathBuf,
}

impl FileSystemPayload {
    pub fn created(channel_id: ChannelId, entry_kind: EntryKind, path: PathBuf) -> Self {
        Self {
            channel_id,
            action: FileSystemAction::Created,
            entry_kind,
            old_path: None,
            path,
        }
    }

    pub fn deleted(channel_id: ChannelId, entry_kind: EntryKind, path: PathBuf) -> Self {
        Self {
            channel_id,
            action: FileSystemAction::Deleted,
            entry_kind,
            old_path: None,
            path,
        }
    }

    pub fn modified(channel_id: ChannelId, entry_kind: EntryKind, path: PathBuf) -> Self {
        Self {
            channel_id,
            action: FileSystemAction::Modified,
            entry_kind,
            old_path: None,
            path,
        }
    }

    pub fn renamed(
        channel_id: ChannelId,
        entry_kind: EntryKind,
        old_path: PathBuf,
        path: PathBuf,
    ) -> Self {
        Self {
            channel_id,
            action: FileSystemAction::Renamed,
            entry_kind,
            old_path: Some(old_path),
            path,
        }
    }
}

impl fmt::Display for FileSystemPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.entry_kind {
            EntryKind::File => "file",
            EntryKind::Directory => "dir",
            EntryKind::Unknown => "entry",
        };
        match self.action {
            FileSystemAction::Created => {
                write!(f, "[{} created {} on {}]", kind, self.path.display(), self.channel_id)
            }
            FileSystemAction::Deleted => {
                write!(f, "[{} deleted {} on {}]", kind, self.path.display(), self.channel_id)
            }
            FileSystemAction::Modified => {
                write!(f, "[{} modified {} on {}]", kind, self.path.display(), self.channel_id)
            }
            FileSystemAction::Renamed => {
                let old = self.old_path.as_deref().unwrap_or_else(|| Path::new("?"));
                write!(
                    f,
                    "[{} renamed {{{} => {}}} on {}]",
                    kind,
                    old.display(),
                    self.path.display(),
                    self.channel_id
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_different() {
        use EntryKind::*;
        assert!(kinds_are_different(File, Directory));
        assert!(kinds_are_different(Directory, File));
        assert!(!kinds_are_different(File, File));
        assert!(!kinds_are_different(Directory, Directory));
        assert!(!kinds_are_different(Unknown, File));
        assert!(!kinds_are_different(Directory, Unknown));
        assert!(!kinds_are_different(Unknown, Unknown));
    }

    #[test]
    fn test_old_path_only_on_rename() {
        let created = FileSystemPayload::created(1, EntryKind::File, PathBuf::from("/tmp/a"));
        assert_eq!(created.action, FileSystemAction::Created);
        assert!(created.old_path.is_none());

        let renamed = FileSystemPayload::renamed(
            1,
            EntryKind::File,
            PathBuf::from("/tmp/a"),
            PathBuf::from("/tmp/b"),
        );
        assert_eq!(renamed.action, FileSystemAction::Renamed);
        assert_eq!(renamed.old_path, Some(PathBuf::from("/tmp/a")));
        assert_eq!(renamed.path, PathBuf::from("/tmp/b"));
    }

    #[test]
    fn test_display_rename() {
        let renamed = FileSystemPayload::renamed(
            7,
            EntryKind::File,
            PathBuf::from("/tmp/x"),
            PathBuf::from("/tmp/y"),
        );
        assert_eq!(renamed.to_string(), "[file renamed {/tmp/x => /tmp/y} on 7]");
    }

    #[test]
    fn test_display_created_dir() {
        let created = FileSystemPayload::created(3, EntryKind::Directory, PathBuf::from("/tmp/d"));
        assert_eq!(created.to_string(), "[dir created /tmp/d on 3]");
    }
}
