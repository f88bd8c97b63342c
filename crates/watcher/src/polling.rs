//! The stat-scan polling backend.
//!
//! Each watched root keeps a cache of entry stamps (kind, size, mtime). A
//! tick resumes or starts one sweep per root, spending at most `throttle`
//! units of work — one unit per directory listed, entry statted, or deletion
//! emitted — strictly round-robinned across roots. A sweep interrupted by
//! the budget carries its cursor to the next tick, so nothing is lost, only
//! deferred.

use crate::errors::BackendError;
use crate::thread::Backend;
use filewatch_messages::{
    kinds_are_different, ChannelId, EntryKind, FileSystemPayload, ThreadStatus,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

pub(crate) const DEFAULT_INTERVAL_MS: u64 = 100;
pub(crate) const DEFAULT_THROTTLE: u64 = 1000;
pub(crate) const MIN_INTERVAL_MS: u64 = 1;
pub(crate) const MIN_THROTTLE: u64 = 1;

/// What the cache remembers about one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntryStamp {
    kind: EntryKind,
    size: u64,
    mtime: Option<SystemTime>,
}

impl From<&Metadata> for EntryStamp {
    fn from(metadata: &Metadata) -> Self {
        Self {
            kind: if metadata.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            },
            size: metadata.len(),
            mtime: metadata.modified().ok(),
        }
    }
}

/// Cursor of an in-progress sweep over one root.
#[derive(Debug, Default)]
struct Sweep {
    /// Directories still to list.
    dirs: Vec<PathBuf>,
    /// Entries listed but not yet statted.
    pending: VecDeque<PathBuf>,
    seen: HashSet<PathBuf>,
    /// Cached entries the sweep never saw; built once listing and statting
    /// are complete, drained as deletion events.
    deletions: Option<Vec<PathBuf>>,
}

impl Sweep {
    fn new(root: PathBuf) -> Self {
        Self {
            dirs: vec![root],
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct PollRoot {
    root: PathBuf,
    entries: HashMap<PathBuf, EntryStamp>,
    sweep: Option<Sweep>,
}

impl PollRoot {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            entries: HashMap::new(),
            sweep: None,
        }
    }

    /// Fill the cache with the current tree without emitting events; a new
    /// watch reports changes, not what already existed.
    fn prime(&mut self) {
        self.sweep = Some(Sweep::new(self.root.clone()));
        let mut discard = Vec::new();
        let mut budget = usize::MAX;
        while !self.advance(0, &mut budget, &mut discard) {}
    }

    /// Perform one unit of work. Returns true once the sweep has completed.
    fn advance(
        &mut self,
        channel: ChannelId,
        budget: &mut usize,
        sink: &mut Vec<FileSystemPayload>,
    ) -> bool {
        let Some(sweep) = self.sweep.as_mut() else {
            return true;
        };

        if let Some(path) = sweep.pending.pop_front() {
            *budget = budget.saturating_sub(1);
            match std::fs::symlink_metadata(&path) {
                Ok(metadata) => {
                    let stamp = EntryStamp::from(&metadata);
                    sweep.seen.insert(path.clone());
                    if metadata.is_dir() && !metadata.file_type().is_symlink() {
                        sweep.dirs.push(path.clone());
                    }
                    match self.entries.get(&path) {
                        None => {
                            self.entries.insert(path.clone(), stamp);
                            sink.push(FileSystemPayload::created(channel, stamp.kind, path));
                        }
                        Some(known) if *known != stamp => {
                            if kinds_are_different(known.kind, stamp.kind) {
                                sink.push(FileSystemPayload::deleted(
                                    channel,
                                    known.kind,
                                    path.clone(),
                                ));
                                sink.push(FileSystemPayload::created(
                                    channel,
                                    stamp.kind,
                                    path.clone(),
                                ));
                            } else {
                                sink.push(FileSystemPayload::modified(
                                    channel,
                                    stamp.kind,
                                    path.clone(),
                                ));
                            }
                            self.entries.insert(path, stamp);
                        }
                        Some(_) => {}
                    }
                }
                Err(_) => {
                    // Vanished between listing and stat; the deletion pass
                    // reports it.
                }
            }
            false
        } else if let Some(dir) = sweep.dirs.pop() {
            *budget = budget.saturating_sub(1);
            match std::fs::read_dir(&dir) {
                Ok(listing) => {
                    for entry in listing.flatten() {
                        sweep.pending.push_back(entry.path());
                    }
                }
                Err(err) => {
                    tracing::debug!(dir = %dir.display(), error = %err, "directory unreadable during sweep");
                }
            }
            false
        } else {
            if sweep.deletions.is_none() {
                let gone: Vec<PathBuf> = self
                    .entries
                    .keys()
                    .filter(|path| !sweep.seen.contains(*path))
                    .cloned()
                    .collect();
                sweep.deletions = Some(gone);
            }
            let Some(deletions) = sweep.deletions.as_mut() else {
                return true;
            };
            if let Some(path) = deletions.pop() {
                *budget = budget.saturating_sub(1);
                if let Some(stamp) = self.entries.remove(&path) {
                    sink.push(FileSystemPayload::deleted(channel, stamp.kind, path));
                }
                false
            } else {
                self.sweep = None;
                true
            }
        }
    }
}

pub(crate) struct PollingBackend {
    interval: Duration,
    throttle: u64,
    /// Deadline of the next tick; `None` while no roots are registered.
    next_tick: Option<Instant>,
    roots: BTreeMap<ChannelId, PollRoot>,
    /// Round-robin rotation so no root is starved under a tight budget.
    rotation: VecDeque<ChannelId>,
}

impl PollingBackend {
    pub(crate) fn new() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            throttle: DEFAULT_THROTTLE,
            next_tick: None,
            roots: BTreeMap::new(),
            rotation: VecDeque::new(),
        }
    }

    fn tick(&mut self, sink: &mut Vec<FileSystemPayload>) {
        let mut budget = self.throttle as usize;
        let order: Vec<ChannelId> = self.rotation.iter().copied().collect();
        let mut finished: HashSet<ChannelId> = HashSet::new();

        while budget > 0 && finished.len() < order.len() {
            for &channel in &order {
                if budget == 0 {
                    break;
                }
                if finished.contains(&channel) {
                    continue;
                }
                let Some(root) = self.roots.get_mut(&channel) else {
                    finished.insert(channel);
                    continue;
                };
                if root.sweep.is_none() {
                    root.sweep = Some(Sweep::new(root.root.clone()));
                }
                // At most one completed sweep per root per tick.
                if root.advance(channel, &mut budget, sink) {
                    finished.insert(channel);
                }
            }
        }

        if let Some(front) = self.rotation.pop_front() {
            self.rotation.push_back(front);
        }
    }
}

impl Backend for PollingBackend {
    fn add_root(&mut self, channel_id: ChannelId, root: &Path) -> Result<(), BackendError> {
        let root = std::fs::canonicalize(root)?;
        let mut poll_root = PollRoot::new(root);
        poll_root.prime();
        tracing::info!(
            channel_id,
            root = %poll_root.root.display(),
            entries = poll_root.entries.len(),
            "watching by polling"
        );
        self.roots.insert(channel_id, poll_root);
        self.rotation.push_back(channel_id);
        if self.next_tick.is_none() {
            self.next_tick = Some(Instant::now() + self.interval);
        }
        Ok(())
    }

    fn remove_channel(&mut self, channel_id: ChannelId) -> Result<(), BackendError> {
        self.roots
            .remove(&channel_id)
            .ok_or(BackendError::UnknownChannel(channel_id))?;
        self.rotation.retain(|&channel| channel != channel_id);
        if self.roots.is_empty() {
            self.next_tick = None;
        }
        tracing::info!(channel_id, "polling channel removed");
        Ok(())
    }

    fn set_interval(&mut self, ms: u64) -> Result<(), BackendError> {
        self.interval = Duration::from_millis(ms.max(MIN_INTERVAL_MS));
        if self.next_tick.is_some() {
            self.next_tick = Some(Instant::now() + self.interval);
        }
        tracing::debug!(interval_ms = ms, "polling interval changed");
        Ok(())
    }

    fn set_throttle(&mut self, limit: u64) -> Result<(), BackendError> {
        self.throttle = limit.max(MIN_THROTTLE);
        tracing::debug!(throttle = self.throttle, "polling throttle changed");
        Ok(())
    }

    fn process(&mut self, sink: &mut Vec<FileSystemPayload>) -> Result<(), BackendError> {
        let Some(next_tick) = self.next_tick else {
            return Ok(());
        };
        let started = Instant::now();
        if started < next_tick {
            return Ok(());
        }
        self.tick(sink);
        // The gap to the next tick is the interval minus however long this
        // tick took, floored at zero.
        self.next_tick = Some(started + self.interval);
        Ok(())
    }

    fn next_wake(&self) -> Option<Duration> {
        self.next_tick
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn collect_status(&self, status: &mut ThreadStatus) {
        status.active_roots = self.roots.len();
    }
}
