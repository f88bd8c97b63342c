//! The host-facing mediator that owns both actor threads, allocates
//! channel and command ids, and routes events and acks back to the
//! registered sinks.

use crate::errors::HubError;
use crate::logging::{self, LogTarget};
use crate::polling::{PollingBackend, MIN_INTERVAL_MS, MIN_THROTTLE};
use crate::signal::HostSignal;
use crate::thread::{Backend, Thread};
use crate::worker::NativeBackend;
use filewatch_messages::{
    AckPayload, ChannelId, CommandAction, CommandId, CommandPayload, FileSystemPayload, Message,
    MessageQueue, Status, NULL_COMMAND_ID,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) const WORKER: &str = "worker";
pub(crate) const POLLING: &str = "polling";

/// Invoked exactly once with the ack for one command.
pub type AckCallback = Box<dyn FnOnce(AckPayload) + Send + 'static>;

/// Invoked from `handle_events` with batches of events for one channel, in
/// arrival order.
pub type EventCallback = Box<dyn FnMut(&[FileSystemPayload]) + Send + 'static>;

enum PendingKind {
    Add { channel_id: ChannelId },
    Remove { channel_id: ChannelId },
    Admin,
}

struct PendingCommand {
    kind: PendingKind,
    callback: AckCallback,
}

struct ChannelEntry {
    callback: EventCallback,
    poll: bool,
}

/// The process-wide watcher resource. Construct one with [`Hub::new`], drive
/// it from the host thread, and let `Drop` (or an explicit
/// [`Hub::shutdown`]) stop the actor threads.
///
/// All methods must be called from the host thread; none of them blocks on
/// the worker or polling thread. Results that cannot be produced
/// synchronously arrive later through the registered ack sink.
pub struct Hub {
    worker: Thread,
    polling: Thread,
    next_command_id: CommandId,
    next_channel_id: ChannelId,
    pending_callbacks: HashMap<CommandId, PendingCommand>,
    channel_callbacks: HashMap<ChannelId, ChannelEntry>,
    orphaned_events: u64,
    unknown_acks: u64,
    main_log: Option<tracing::dispatcher::DefaultGuard>,
}

impl Hub {
    /// Start the worker and polling threads over the default backends. The
    /// signal is raised whenever either thread has output ready; the host
    /// must respond by calling [`Hub::handle_events`].
    pub fn new(signal: Arc<dyn HostSignal>) -> Result<Self, HubError> {
        let worker_inbound = Arc::new(MessageQueue::new());
        let native = NativeBackend::new(Arc::clone(&worker_inbound))?;
        let worker = Thread::spawn(WORKER, worker_inbound, native, Arc::clone(&signal))?;
        let polling = Thread::spawn(
            POLLING,
            Arc::new(MessageQueue::new()),
            PollingBackend::new(),
            signal,
        )?;
        Ok(Self::assemble(worker, polling))
    }

    /// Start over caller-provided backends. The backend contract is the
    /// [`Backend`] trait; this is how tests and embedders substitute their
    /// own event sources.
    pub fn with_backends<W, P>(
        worker_backend: W,
        polling_backend: P,
        signal: Arc<dyn HostSignal>,
    ) -> Result<Self, HubError>
    where
        W: Backend,
        P: Backend,
    {
        let worker = Thread::spawn(
            WORKER,
            Arc::new(MessageQueue::new()),
            worker_backend,
            Arc::clone(&signal),
        )?;
        let polling = Thread::spawn(
            POLLING,
            Arc::new(MessageQueue::new()),
            polling_backend,
            signal,
        )?;
        Ok(Self::assemble(worker, polling))
    }

    fn assemble(worker: Thread, polling: Thread) -> Self {
        Self {
            worker,
            polling,
            next_command_id: 1,
            next_channel_id: 1,
            pending_callbacks: HashMap::new(),
            channel_callbacks: HashMap::new(),
            orphaned_events: 0,
            unknown_acks: 0,
            main_log: None,
        }
    }

    /// Begin watching `root`. Returns the new channel id immediately;
    /// `ack_callback` fires once the chosen backend has accepted or
    /// rejected the subscription, and `event_callback` receives every event
    /// reported for the channel from then on.
    pub fn watch(
        &mut self,
        root: impl Into<PathBuf>,
        poll: bool,
        ack_callback: AckCallback,
        event_callback: EventCallback,
    ) -> Result<ChannelId, HubError> {
        let channel_id = self.next_channel_id;
        self.next_channel_id += 1;
        let command_id = self.next_command_id;
        self.next_command_id += 1;

        let thread = if poll { &self.polling } else { &self.worker };
        thread.send(CommandPayload::add(command_id, root.into(), channel_id))?;

        self.channel_callbacks.insert(
            channel_id,
            ChannelEntry {
                callback: event_callback,
                poll,
            },
        );
        self.pending_callbacks.insert(
            command_id,
            PendingCommand {
                kind: PendingKind::Add { channel_id },
                callback: ack_callback,
            },
        );
        Ok(channel_id)
    }

    /// Stop watching `channel_id`. The channel's event sink keeps receiving
    /// events already in flight until the REMOVE ack arrives; an unknown
    /// channel id is answered with an immediate failure ack.
    pub fn unwatch(
        &mut self,
        channel_id: ChannelId,
        ack_callback: AckCallback,
    ) -> Result<(), HubError> {
        let Some(entry) = self.channel_callbacks.get(&channel_id) else {
            let command = CommandPayload::remove(NULL_COMMAND_ID, channel_id);
            ack_callback(AckPayload::err(
                &command,
                format!("unknown channel {channel_id}"),
            ));
            return Ok(());
        };
        let poll = entry.poll;

        let command_id = self.next_command_id;
        self.next_command_id += 1;

        let thread = if poll { &self.polling } else { &self.worker };
        thread.send(CommandPayload::remove(command_id, channel_id))?;

        self.pending_callbacks.insert(
            command_id,
            PendingCommand {
                kind: PendingKind::Remove { channel_id },
                callback: ack_callback,
            },
        );
        Ok(())
    }

    pub fn use_main_log_file(&mut self, path: impl Into<PathBuf>) -> Result<(), HubError> {
        self.set_main_log(LogTarget::File(path.into()))
    }

    pub fn use_main_log_stderr(&mut self) -> Result<(), HubError> {
        self.set_main_log(LogTarget::Stderr)
    }

    pub fn use_main_log_stdout(&mut self) -> Result<(), HubError> {
        self.set_main_log(LogTarget::Stdout)
    }

    pub fn disable_main_log(&mut self) -> Result<(), HubError> {
        self.set_main_log(LogTarget::Disabled)
    }

    fn set_main_log(&mut self, target: LogTarget) -> Result<(), HubError> {
        let dispatch = logging::build_dispatch(&target)?;
        self.main_log = Some(tracing::dispatcher::set_default(&dispatch));
        Ok(())
    }

    pub fn use_worker_log_file(
        &mut self,
        path: impl Into<PathBuf>,
        ack_callback: AckCallback,
    ) -> Result<(), HubError> {
        let path = path.into();
        self.send_admin(false, ack_callback, |id| CommandPayload::log_file(id, path))
    }

    pub fn use_worker_log_stderr(&mut self, ack_callback: AckCallback) -> Result<(), HubError> {
        self.send_admin(false, ack_callback, |id| {
            CommandPayload::plain(id, CommandAction::LogStderr)
        })
    }

    pub fn use_worker_log_stdout(&mut self, ack_callback: AckCallback) -> Result<(), HubError> {
        self.send_admin(false, ack_callback, |id| {
            CommandPayload::plain(id, CommandAction::LogStdout)
        })
    }

    pub fn disable_worker_log(&mut self, ack_callback: AckCallback) -> Result<(), HubError> {
        self.send_admin(false, ack_callback, |id| {
            CommandPayload::plain(id, CommandAction::LogDisable)
        })
    }

    pub fn use_polling_log_file(
        &mut self,
        path: impl Into<PathBuf>,
        ack_callback: AckCallback,
    ) -> Result<(), HubError> {
        let path = path.into();
        self.send_admin(true, ack_callback, |id| CommandPayload::log_file(id, path))
    }

    pub fn use_polling_log_stderr(&mut self, ack_callback: AckCallback) -> Result<(), HubError> {
        self.send_admin(true, ack_callback, |id| {
            CommandPayload::plain(id, CommandAction::LogStderr)
        })
    }

    pub fn use_polling_log_stdout(&mut self, ack_callback: AckCallback) -> Result<(), HubError> {
        self.send_admin(true, ack_callback, |id| {
            CommandPayload::plain(id, CommandAction::LogStdout)
        })
    }

    pub fn disable_polling_log(&mut self, ack_callback: AckCallback) -> Result<(), HubError> {
        self.send_admin(true, ack_callback, |id| {
            CommandPayload::plain(id, CommandAction::LogDisable)
        })
    }

    /// Change the polling scan cadence. Values below 1 ms are rejected
    /// synchronously.
    pub fn set_polling_interval(
        &mut self,
        ms: u64,
        ack_callback: AckCallback,
    ) -> Result<(), HubError> {
        if ms < MIN_INTERVAL_MS {
            return Err(HubError::InvalidArgument {
                what: "polling interval",
                value: ms,
                min: MIN_INTERVAL_MS,
            });
        }
        self.send_admin(true, ack_callback, |id| {
            CommandPayload::tunable(id, CommandAction::PollingInterval, ms)
        })
    }

    /// Change the maximum number of polling events per tick. Values below 1
    /// are rejected synchronously.
    pub fn set_polling_throttle(
        &mut self,
        limit: u64,
        ack_callback: AckCallback,
    ) -> Result<(), HubError> {
        if limit < MIN_THROTTLE {
            return Err(HubError::InvalidArgument {
                what: "polling throttle",
                value: limit,
                min: MIN_THROTTLE,
            });
        }
        self.send_admin(true, ack_callback, |id| {
            CommandPayload::tunable(id, CommandAction::PollingThrottle, limit)
        })
    }

    /// Ask the worker thread to flush buffered backend output, then ack.
    pub fn drain_worker(&mut self, ack_callback: AckCallback) -> Result<(), HubError> {
        self.send_admin(false, ack_callback, |id| {
            CommandPayload::plain(id, CommandAction::Drain)
        })
    }

    /// Ask the polling thread to flush buffered backend output, then ack.
    pub fn drain_polling(&mut self, ack_callback: AckCallback) -> Result<(), HubError> {
        self.send_admin(true, ack_callback, |id| {
            CommandPayload::plain(id, CommandAction::Drain)
        })
    }

    fn send_admin(
        &mut self,
        to_polling: bool,
        ack_callback: AckCallback,
        build: impl FnOnce(CommandId) -> CommandPayload,
    ) -> Result<(), HubError> {
        let command_id = self.next_command_id;
        self.next_command_id += 1;

        let thread = if to_polling { &self.polling } else { &self.worker };
        thread.send(build(command_id))?;

        self.pending_callbacks.insert(
            command_id,
            PendingCommand {
                kind: PendingKind::Admin,
                callback: ack_callback,
            },
        );
        Ok(())
    }

    /// Drain both threads' outbound queues and invoke the registered sinks.
    /// Must be called from the host thread whenever the signal is raised.
    /// The worker thread is drained first; within a thread, strict FIFO.
    pub fn handle_events(&mut self) {
        let worker_messages = self.worker.receive_all();
        let polling_messages = self.polling.receive_all();
        self.dispatch(worker_messages);
        self.dispatch(polling_messages);
    }

    fn dispatch(&mut self, messages: Vec<Message>) {
        // Consecutive events coalesce into per-channel batches; the batches
        // are flushed before any ack is handled so a REMOVE ack cannot
        // suppress events that were enqueued ahead of it.
        let mut batch_order: Vec<ChannelId> = Vec::new();
        let mut batches: HashMap<ChannelId, Vec<FileSystemPayload>> = HashMap::new();

        for message in messages {
            match message {
                Message::FileSystem(payload) => {
                    if self.channel_callbacks.contains_key(&payload.channel_id) {
                        batches
                            .entry(payload.channel_id)
                            .or_insert_with(|| {
                                batch_order.push(payload.channel_id);
                                Vec::new()
                            })
                            .push(payload);
                    } else {
                        self.orphaned_events += 1;
                        tracing::warn!(
                            channel_id = payload.channel_id,
                            event = %payload,
                            "dropping event for unwatched channel"
                        );
                    }
                }
                Message::Ack(ack) => {
                    self.flush_batches(&mut batch_order, &mut batches);
                    self.handle_ack(ack);
                }
                Message::Command(command) => {
                    tracing::warn!(%command, "discarding unexpected outbound command");
                }
            }
        }
        self.flush_batches(&mut batch_order, &mut batches);
    }

    fn flush_batches(
        &mut self,
        order: &mut Vec<ChannelId>,
        batches: &mut HashMap<ChannelId, Vec<FileSystemPayload>>,
    ) {
        for channel_id in order.drain(..) {
            let Some(payloads) = batches.remove(&channel_id) else {
                continue;
            };
            if let Some(entry) = self.channel_callbacks.get_mut(&channel_id) {
                (entry.callback)(&payloads);
            }
        }
    }

    fn handle_ack(&mut self, ack: AckPayload) {
        let Some(pending) = self.pending_callbacks.remove(&ack.command_id) else {
            self.unknown_acks += 1;
            tracing::warn!(command_id = ack.command_id, ack = %ack, "dropping ack for unknown command");
            return;
        };
        match pending.kind {
            PendingKind::Add { channel_id } if !ack.success => {
                self.channel_callbacks.remove(&channel_id);
            }
            PendingKind::Remove { channel_id } if ack.success => {
                self.channel_callbacks.remove(&channel_id);
            }
            _ => {}
        }
        (pending.callback)(ack);
    }

    /// Fill `status` with hub-level counts and both threads' snapshots.
    pub fn collect_status(&self, status: &mut Status) {
        status.pending_callbacks = self.pending_callbacks.len();
        status.active_channels = self.channel_callbacks.len();
        status.orphaned_events = self.orphaned_events;
        status.unknown_acks = self.unknown_acks;
        self.worker.collect_status(&mut status.worker);
        self.polling.collect_status(&mut status.polling);
    }

    /// Stop both threads and deliver their final output, including the
    /// failure acks synthesised for commands that never ran. Idempotent.
    pub fn shutdown(&mut self) {
        self.worker.stop();
        self.polling.stop();
        self.handle_events();
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.shutdown();
    }
}
