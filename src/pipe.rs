//! Bounded, owner-read FIFO of JSON messages.
//!
//! A pipe is created by one session (its owner) and may be written to by any
//! session that knows its id. Only the owner reads or closes it. The buffer
//! is bounded: when a write would exceed capacity the **oldest** messages are
//! evicted and counted in `drops`, so slow readers never stall writers —
//! fan-out prefers fresh data.
//!
//! ```text
//! writers ──write──► [ VecDeque, cap N ] ──read(max, timeout)──► owner
//!                        │ overflow
//!                        ▼
//!                    drops += evicted   (reported and reset on next Read)
//! ```
//!
//! Writes never block. `read` is the only suspending operation: it parks on
//! a [`Notify`] until the buffer is non-empty, the pipe closes, or the
//! deadline elapses. Concurrent reads on the same pipe are serialized by the
//! buffer lock; the protocol exercises a single reader per pipe.

// Rust guideline compliant 2026-02

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{ErrKind, RpcError, RpcResult};

/// Default pipe capacity when `pipe.create` gives no `length`.
pub const DEFAULT_PIPE_CAPACITY: usize = 1000;

/// One buffered message with its per-pipe arrival sequence number.
///
/// Topic deliveries additionally carry the topic name so a reader can
/// distinguish origin.
#[derive(Debug, Clone, Serialize)]
pub struct PipeMessage {
    /// Arrival sequence number, monotonic per pipe, starting at 1.
    pub count: u64,
    /// Topic name for fan-out deliveries; absent for direct writes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// The payload as the writer supplied it.
    pub msg: Value,
}

/// Result of a `read` call.
#[derive(Debug, Default, Serialize)]
pub struct ReadBatch {
    /// Up to `max` messages in arrival order. Empty means the deadline
    /// elapsed with nothing buffered.
    pub msgs: Vec<PipeMessage>,
    /// Messages still buffered after this batch was taken.
    pub waiting: usize,
    /// Messages evicted by overflow since the previous read; reset to zero
    /// atomically with the batch.
    pub drops: u64,
}

#[derive(Debug)]
struct PipeState {
    buf: VecDeque<PipeMessage>,
    next_count: u64,
    drops: u64,
    closed: bool,
}

/// A bounded FIFO bound to its owning session.
#[derive(Debug)]
pub struct Pipe {
    id: String,
    owner: String,
    capacity: usize,
    state: Mutex<PipeState>,
    readable: Notify,
}

impl Pipe {
    /// Create a pipe. `capacity` must be ≥ 1 (validated by the dispatcher).
    #[must_use]
    pub fn new(id: String, owner: String, capacity: usize) -> Self {
        Self {
            id,
            owner,
            capacity: capacity.max(1),
            state: Mutex::new(PipeState {
                buf: VecDeque::new(),
                next_count: 1,
                drops: 0,
                closed: false,
            }),
            readable: Notify::new(),
        }
    }

    /// The pipe's opaque id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Session id of the owner (the only session allowed to read or close).
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once the pipe has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("pipe state poisoned").closed
    }

    /// Messages currently buffered.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.lock().expect("pipe state poisoned").buf.len()
    }

    /// Append messages, evicting the oldest on overflow and waking a blocked
    /// reader.
    ///
    /// Returns the number of messages appended. Never blocks.
    ///
    /// # Errors
    ///
    /// `InvalidPipe` if the pipe is closed.
    pub fn write(&self, msgs: Vec<Value>, topic: Option<&str>) -> RpcResult<usize> {
        let appended = {
            let mut st = self.state.lock().expect("pipe state poisoned");
            if st.closed {
                return Err(RpcError::new(ErrKind::InvalidPipe));
            }
            let n = msgs.len();
            for msg in msgs {
                let count = st.next_count;
                st.next_count += 1;
                st.buf.push_back(PipeMessage {
                    count,
                    topic: topic.map(str::to_owned),
                    msg,
                });
            }
            while st.buf.len() > self.capacity {
                st.buf.pop_front();
                st.drops += 1;
            }
            n
        };
        if appended > 0 {
            self.readable.notify_one();
        }
        Ok(appended)
    }

    /// Drain up to `max` messages, blocking up to `timeout` for the first.
    ///
    /// Returns immediately once any message is available (never waits to
    /// fill `max`). On deadline expiry with nothing buffered, returns an
    /// empty batch rather than an error. The drop counter is reported and
    /// reset atomically with a non-empty batch.
    ///
    /// # Errors
    ///
    /// `InvalidPipe` if `caller` is not the owner, or if the pipe is (or
    /// becomes, while blocked) closed.
    pub async fn read(&self, caller: &str, max: usize, timeout: Duration) -> RpcResult<ReadBatch> {
        if caller != self.owner {
            return Err(RpcError::new(ErrKind::InvalidPipe));
        }
        let max = max.max(1);
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking state so a wake between the
            // unlock and the await is not lost.
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut st = self.state.lock().expect("pipe state poisoned");
                if st.closed {
                    return Err(RpcError::new(ErrKind::InvalidPipe));
                }
                if !st.buf.is_empty() {
                    let take = max.min(st.buf.len());
                    let msgs: Vec<PipeMessage> = st.buf.drain(..take).collect();
                    return Ok(ReadBatch {
                        msgs,
                        waiting: st.buf.len(),
                        drops: std::mem::take(&mut st.drops),
                    });
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(ReadBatch::default());
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(ReadBatch::default());
            }
        }
    }

    /// Mark closed and wake any blocked reader (which observes
    /// `InvalidPipe`). Idempotent; subsequent writes and reads fail.
    pub fn mark_closed(&self) {
        {
            let mut st = self.state.lock().expect("pipe state poisoned");
            if st.closed {
                return;
            }
            st.closed = true;
            st.buf.clear();
        }
        // Wake a parked reader and leave a permit for one about to park.
        self.readable.notify_waiters();
        self.readable.notify_one();
    }
}
