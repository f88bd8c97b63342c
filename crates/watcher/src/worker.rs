//! The native-events backend driven by the worker thread.
//!
//! Wraps `notify`'s recommended OS watcher. The notify callback runs on
//! notify's own thread: it forwards raw events into a channel and interrupts
//! the worker's inbound queue so the worker wakes to translate them.

use crate::errors::BackendError;
use crate::thread::Backend;
use filewatch_messages::{ChannelId, EntryKind, FileSystemPayload, MessageQueue, ThreadStatus};
use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long an unmatched rename-from event waits for its rename-to half
/// before being reported as a deletion.
const RENAME_GRACE: Duration = Duration::from_millis(500);

struct PendingRename {
    since: Instant,
    path: PathBuf,
}

pub(crate) struct NativeBackend {
    watcher: RecommendedWatcher,
    events: Receiver<notify::Result<notify::Event>>,
    /// Channel to watched root. BTreeMap keeps fan-out order deterministic.
    roots: BTreeMap<ChannelId, PathBuf>,
    pending_renames: VecDeque<PendingRename>,
}

impl NativeBackend {
    /// `waker` is the worker thread's inbound queue; arriving native events
    /// interrupt it so the worker wakes without a command.
    pub(crate) fn new(waker: Arc<MessageQueue>) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let watcher = RecommendedWatcher::new(
            move |result: notify::Result<notify::Event>| {
                let _ = tx.send(result);
                waker.interrupt();
            },
            Config::default(),
        )?;
        Ok(Self {
            watcher,
            events: rx,
            roots: BTreeMap::new(),
            pending_renames: VecDeque::new(),
        })
    }

    /// Channels whose root covers `path`, in channel order.
    fn channels_for(&self, path: &Path) -> Vec<ChannelId> {
        self.roots
            .iter()
            .filter(|(_, root)| path.starts_with(root))
            .map(|(&channel, _)| channel)
            .collect()
    }

    fn emit(
        &self,
        sink: &mut Vec<FileSystemPayload>,
        path: &Path,
        kind: EntryKind,
        build: impl Fn(ChannelId, EntryKind, PathBuf) -> FileSystemPayload,
    ) {
        for channel in self.channels_for(path) {
            sink.push(build(channel, kind, path.to_path_buf()));
        }
    }

    fn emit_rename(&self, sink: &mut Vec<FileSystemPayload>, old: &Path, new: &Path) {
        let kind = probe_kind(new);
        for (&channel, root) in &self.roots {
            let covers_old = old.starts_with(root);
            let covers_new = new.starts_with(root);
            if covers_old && covers_new {
                sink.push(FileSystemPayload::renamed(
                    channel,
                    kind,
                    old.to_path_buf(),
                    new.to_path_buf(),
                ));
            } else if covers_old {
                sink.push(FileSystemPayload::deleted(channel, kind, old.to_path_buf()));
            } else if covers_new {
                sink.push(FileSystemPayload::created(channel, kind, new.to_path_buf()));
            }
        }
    }

    fn translate(&mut self, event: notify::Event, sink: &mut Vec<FileSystemPayload>) {
        match event.kind {
            EventKind::Create(kind) => {
                for path in &event.paths {
                    let kind = match kind {
                        CreateKind::File => EntryKind::File,
                        CreateKind::Folder => EntryKind::Directory,
                        _ => probe_kind(path),
                    };
                    self.emit(sink, path, kind, FileSystemPayload::created);
                }
            }
            EventKind::Remove(kind) => {
                for path in &event.paths {
                    let kind = match kind {
                        RemoveKind::File => EntryKind::File,
                        RemoveKind::Folder => EntryKind::Directory,
                        _ => EntryKind::Unknown,
                    };
                    self.emit(sink, path, kind, FileSystemPayload::deleted);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [old, new] = event.paths.as_slice() {
                    // The from-half of this pair may already have arrived as
                    // a lone rename-from event; it is accounted for now.
                    self.pending_renames.retain(|pending| pending.path != *old);
                    self.emit_rename(sink, old, new);
                } else if let Some(path) = event.paths.first() {
                    self.emit(sink, path, probe_kind(path), FileSystemPayload::modified);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                if let Some(path) = event.paths.first() {
                    self.pending_renames.push_back(PendingRename {
                        since: Instant::now(),
                        path: path.clone(),
                    });
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                if let Some(new) = event.paths.first() {
                    match self.pending_renames.pop_front() {
                        Some(pending) => self.emit_rename(sink, &pending.path, new),
                        None => self.emit(sink, new, probe_kind(new), FileSystemPayload::created),
                    }
                }
            }
            EventKind::Modify(_) => {
                for path in &event.paths {
                    self.emit(sink, path, probe_kind(path), FileSystemPayload::modified);
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {
                tracing::trace!(?event, "ignoring native event");
            }
        }
    }

    /// Rename-from halves that never found their rename-to are deletions.
    fn flush_stale_renames(&mut self, sink: &mut Vec<FileSystemPayload>) {
        let now = Instant::now();
        while self
            .pending_renames
            .front()
            .is_some_and(|pending| now.duration_since(pending.since) >= RENAME_GRACE)
        {
            if let Some(pending) = self.pending_renames.pop_front() {
                self.emit(
                    sink,
                    &pending.path,
                    EntryKind::Unknown,
                    FileSystemPayload::deleted,
                );
            }
        }
    }
}

impl Backend for NativeBackend {
    fn add_root(&mut self, channel_id: ChannelId, root: &Path) -> Result<(), BackendError> {
        let root = std::fs::canonicalize(root)?;
        if !self.roots.values().any(|watched| watched == &root) {
            self.watcher.watch(&root, RecursiveMode::Recursive)?;
        }
        tracing::info!(channel_id, root = %root.display(), "watching natively");
        self.roots.insert(channel_id, root);
        Ok(())
    }

    fn remove_channel(&mut self, channel_id: ChannelId) -> Result<(), BackendError> {
        let root = self
            .roots
            .remove(&channel_id)
            .ok_or(BackendError::UnknownChannel(channel_id))?;
        if !self.roots.values().any(|watched| watched == &root) {
            if let Err(err) = self.watcher.unwatch(&root) {
                // The path may already be gone; the subscription is dead
                // either way.
                tracing::warn!(root = %root.display(), error = %err, "unwatch failed");
            }
        }
        tracing::info!(channel_id, root = %root.display(), "channel removed");
        Ok(())
    }

    fn process(&mut self, sink: &mut Vec<FileSystemPayload>) -> Result<(), BackendError> {
        loop {
            match self.events.try_recv() {
                Ok(Ok(event)) => self.translate(event, sink),
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "native watcher reported an error")
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(BackendError::Lost(
                        "native event channel disconnected".into(),
                    ));
                }
            }
        }
        self.flush_stale_renames(sink);
        Ok(())
    }

    fn next_wake(&self) -> Option<Duration> {
        self.pending_renames.front().map(|pending| {
            RENAME_GRACE.saturating_sub(pending.since.elapsed())
        })
    }

    fn collect_status(&self, status: &mut ThreadStatus) {
        status.active_roots = self.roots.len();
    }
}

fn probe_kind(path: &Path) -> EntryKind {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => EntryKind::Directory,
        Ok(_) => EntryKind::File,
        Err(_) => EntryKind::Unknown,
    }
}
