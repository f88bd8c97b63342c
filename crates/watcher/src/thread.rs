//! The behaviour shared by the worker and polling threads: command queue,
//! acknowledgement, wakeup and log reconfiguration.

use crate::errors::BackendError;
use crate::logging::{self, LogTarget};
use crate::signal::HostSignal;
use filewatch_messages::{
    AckPayload, ChannelId, CommandAction, CommandPayload, FileSystemPayload, Message,
    MessageQueue, ThreadState, ThreadStatus,
};
use parking_lot::Mutex;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Ack message attached to commands that were still queued when their
/// thread went away.
pub(crate) const THREAD_TERMINATED: &str = "thread terminated";

/// The contract a thread consumes from its backend.
///
/// `add_root`, `remove_channel` and the polling tunables are invoked once
/// per command; `process` is invoked once per wakeup (before the commands
/// drained by that wakeup are handled, and again for DRAIN) and appends any
/// produced events to `sink`. A fatal error (`BackendError::is_fatal`)
/// terminates the owning thread.
pub trait Backend: Send + 'static {
    fn add_root(&mut self, channel_id: ChannelId, root: &Path) -> Result<(), BackendError>;

    fn remove_channel(&mut self, channel_id: ChannelId) -> Result<(), BackendError>;

    fn set_interval(&mut self, _ms: u64) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("polling interval"))
    }

    fn set_throttle(&mut self, _limit: u64) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("polling throttle"))
    }

    fn process(&mut self, sink: &mut Vec<FileSystemPayload>) -> Result<(), BackendError>;

    /// How long the thread may block waiting for commands before the
    /// backend wants to run again. `None` means indefinitely.
    fn next_wake(&self) -> Option<Duration> {
        None
    }

    fn collect_status(&self, status: &mut ThreadStatus);
}

/// Host-side handle to one actor thread. Owned by the hub.
pub(crate) struct Thread {
    name: &'static str,
    inbound: Arc<MessageQueue>,
    outbound: Arc<MessageQueue>,
    status: Arc<Mutex<ThreadStatus>>,
    join: Option<JoinHandle<()>>,
}

impl Thread {
    /// Spawn the actor loop over `backend`. `inbound` is created by the
    /// caller so backends can hold a wakeup handle to it.
    pub(crate) fn spawn<B: Backend>(
        name: &'static str,
        inbound: Arc<MessageQueue>,
        backend: B,
        signal: Arc<dyn HostSignal>,
    ) -> io::Result<Self> {
        let outbound = Arc::new(MessageQueue::new());
        let status = Arc::new(Mutex::new(ThreadStatus {
            state: ThreadState::Running,
            ..ThreadStatus::default()
        }));
        let actor = Actor {
            name,
            inbound: Arc::clone(&inbound),
            outbound: Arc::clone(&outbound),
            status: Arc::clone(&status),
            signal,
            backend,
            events_emitted: 0,
        };
        let join = std::thread::Builder::new()
            .name(format!("filewatch-{name}"))
            .spawn(move || actor.run())?;
        Ok(Self {
            name,
            inbound,
            outbound,
            status,
            join: Some(join),
        })
    }

    /// Enqueue a command and wake the thread. Fails synchronously once the
    /// thread has terminated.
    pub(crate) fn send(&self, command: CommandPayload) -> Result<(), crate::HubError> {
        self.inbound
            .push(command.into())
            .map_err(|_| crate::HubError::ThreadStopped(self.name))
    }

    /// Atomically drain the outbound queue.
    pub(crate) fn receive_all(&self) -> Vec<Message> {
        self.outbound.drain()
    }

    /// Close the command queue and join. Idempotent.
    pub(crate) fn stop(&mut self) {
        self.inbound.close();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!(thread = self.name, "actor thread panicked");
            }
            self.status.lock().state = ThreadState::Stopped;
        }
    }

    pub(crate) fn collect_status(&self, status: &mut ThreadStatus) {
        *status = self.status.lock().clone();
        status.in_size = self.inbound.len();
        status.in_high_water = self.inbound.high_water();
        status.out_size = self.outbound.len();
        status.out_high_water = self.outbound.high_water();
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The state owned by the spawned OS thread.
struct Actor<B: Backend> {
    name: &'static str,
    inbound: Arc<MessageQueue>,
    outbound: Arc<MessageQueue>,
    status: Arc<Mutex<ThreadStatus>>,
    signal: Arc<dyn HostSignal>,
    backend: B,
    events_emitted: u64,
}

impl<B: Backend> Actor<B> {
    fn run(mut self) {
        let mut log_guard = None;
        loop {
            let drained = self.inbound.wait_drain(self.backend.next_wake());
            let mut outgoing: Vec<Message> = Vec::new();
            let mut fatal: Option<BackendError> = None;

            // Events that predate this batch of commands go out first, so an
            // ack is never delivered before events the backend produced
            // earlier.
            self.poll_backend(&mut outgoing, &mut fatal);

            if drained.closed {
                self.terminate(drained.messages, outgoing);
                return;
            }

            for message in drained.messages {
                let Message::Command(command) = message else {
                    tracing::warn!(thread = self.name, %message, "discarding unexpected inbound message");
                    continue;
                };
                if fatal.is_some() {
                    outgoing.push(AckPayload::err(&command, THREAD_TERMINATED).into());
                    continue;
                }
                tracing::debug!(thread = self.name, %command, "processing command");
                match self.handle_command(&command, &mut outgoing, &mut log_guard) {
                    Ok(()) => outgoing.push(AckPayload::ok(&command).into()),
                    Err(err) => {
                        let is_fatal = err.is_fatal();
                        outgoing.push(AckPayload::err(&command, err.to_string()).into());
                        if is_fatal {
                            fatal = Some(err);
                        }
                    }
                }
            }

            self.flush(outgoing);
            self.publish_status(ThreadState::Running);

            if let Some(err) = fatal {
                tracing::error!(thread = self.name, error = %err, "backend failed, stopping");
                self.fail();
                return;
            }
        }
    }

    fn handle_command(
        &mut self,
        command: &CommandPayload,
        outgoing: &mut Vec<Message>,
        log_guard: &mut Option<tracing::dispatcher::DefaultGuard>,
    ) -> Result<(), BackendError> {
        match command.action {
            CommandAction::Add => {
                let root = command.root.as_deref().ok_or(BackendError::MissingRoot)?;
                self.backend.add_root(command.arg, root)
            }
            CommandAction::Remove => self.backend.remove_channel(command.arg),
            CommandAction::PollingInterval => self.backend.set_interval(command.arg),
            CommandAction::PollingThrottle => self.backend.set_throttle(command.arg),
            CommandAction::Drain => {
                // Flush backend-buffered events ahead of the ack.
                let mut sink = Vec::new();
                let result = self.backend.process(&mut sink);
                outgoing.extend(sink.into_iter().map(Message::from));
                result
            }
            CommandAction::LogFile
            | CommandAction::LogStderr
            | CommandAction::LogStdout
            | CommandAction::LogDisable => {
                let target = match command.action {
                    CommandAction::LogFile => LogTarget::File(
                        command.root.clone().ok_or(BackendError::MissingRoot)?,
                    ),
                    CommandAction::LogStderr => LogTarget::Stderr,
                    CommandAction::LogStdout => LogTarget::Stdout,
                    _ => LogTarget::Disabled,
                };
                let dispatch = logging::build_dispatch(&target)?;
                *log_guard = Some(tracing::dispatcher::set_default(&dispatch));
                Ok(())
            }
        }
    }

    fn poll_backend(&mut self, outgoing: &mut Vec<Message>, fatal: &mut Option<BackendError>) {
        let mut sink = Vec::new();
        match self.backend.process(&mut sink) {
            Ok(()) => {}
            Err(err) if err.is_fatal() => *fatal = Some(err),
            Err(err) => tracing::warn!(thread = self.name, error = %err, "backend poll failed"),
        }
        outgoing.extend(sink.into_iter().map(Message::from));
    }

    /// Stop requested by the host: everything still queued gets a failure
    /// ack, buffered output is flushed, then the thread exits.
    fn terminate(mut self, remaining: Vec<Message>, mut outgoing: Vec<Message>) {
        for message in remaining {
            if let Message::Command(command) = message {
                outgoing.push(AckPayload::err(&command, THREAD_TERMINATED).into());
            }
        }
        self.flush(outgoing);
        self.publish_status(ThreadState::Stopping);
    }

    /// Fatal backend error: refuse further sends, then ack out anything that
    /// raced into the queue.
    fn fail(&mut self) {
        self.inbound.close();
        let mut outgoing = Vec::new();
        for message in self.inbound.drain() {
            if let Message::Command(command) = message {
                outgoing.push(AckPayload::err(&command, THREAD_TERMINATED).into());
            }
        }
        self.flush(outgoing);
        self.publish_status(ThreadState::Stopping);
    }

    fn flush(&mut self, outgoing: Vec<Message>) {
        if outgoing.is_empty() {
            return;
        }
        for message in outgoing {
            if matches!(message, Message::FileSystem(_)) {
                self.events_emitted += 1;
            }
            if self.outbound.push(message).is_err() {
                return;
            }
        }
        self.signal.raise();
    }

    fn publish_status(&self, state: ThreadState) {
        let mut snapshot = ThreadStatus {
            state,
            events_emitted: self.events_emitted,
            ..ThreadStatus::default()
        };
        self.backend.collect_status(&mut snapshot);
        *self.status.lock() = snapshot;
    }
}
