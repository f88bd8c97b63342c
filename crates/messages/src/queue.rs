//! The mutex-guarded message buffer each thread direction runs on.

use crate::message::Message;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Returned by [`MessageQueue::push`] once the queue has been closed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("message queue is closed")]
pub struct QueueClosed;

/// The result of one blocking drain: whatever was buffered, plus whether the
/// queue has been closed (in which case no further messages can arrive).
#[derive(Debug)]
pub struct Drained {
    pub messages: Vec<Message>,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct State {
    buffer: Vec<Message>,
    high_water: usize,
    closed: bool,
    interrupted: bool,
}

/// An unbounded multi-producer, single-consumer message buffer.
///
/// Producers append under the lock; the consumer swaps the whole buffer out
/// to drain it in one batch, keeping critical sections short. The queue
/// tracks its high-water mark for diagnostics and carries a wakeup condvar
/// so a consumer can block until work arrives, the queue is closed, or it is
/// interrupted from outside (the native backend uses this to wake the worker
/// when events arrive without enqueuing anything).
#[derive(Debug, Default)]
pub struct MessageQueue {
    state: Mutex<State>,
    available: Condvar,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and wake the consumer.
    pub fn push(&self, message: Message) -> Result<(), QueueClosed> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueClosed);
        }
        state.buffer.push(message);
        state.high_water = state.high_water.max(state.buffer.len());
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Swap the buffer out without blocking.
    pub fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut self.state.lock().buffer)
    }

    /// Block until the queue is non-empty, closed, interrupted, or `timeout`
    /// elapses, then swap the buffer out.
    pub fn wait_drain(&self, timeout: Option<Duration>) -> Drained {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        while state.buffer.is_empty() && !state.closed && !state.interrupted {
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
        state.interrupted = false;
        Drained {
            messages: std::mem::take(&mut state.buffer),
            closed: state.closed,
        }
    }

    /// Wake a blocked consumer without enqueuing anything.
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupted = true;
        drop(state);
        self.available.notify_one();
    }

    /// Refuse further pushes and wake the consumer. Buffered messages remain
    /// drainable.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The largest number of messages ever buffered at once.
    pub fn high_water(&self) -> usize {
        self.state.lock().high_water
    }
}
