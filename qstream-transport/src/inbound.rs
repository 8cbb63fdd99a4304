// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// The hand-off between the session's delivery path and a stream's reader.

use std::{collections::VecDeque, fmt::Debug, time::Instant};

use parking_lot::{Condvar, Mutex};
use qstream_common::{qdebug, qtrace};

use crate::{frame::StreamFrame, stream_id::StreamId, Error, Res};

/// How long a consumer is prepared to wait for the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Only take what is already queued.
    NonBlocking,
    /// Wait for a frame or an error, optionally giving up at a deadline.
    Blocking(Option<Instant>),
}

/// Where a stream's reassembly pulls frames from.
pub trait FrameSource: Debug {
    /// The next frame in arrival order.
    ///
    /// Returns `Ok(None)` only for [`Wait::NonBlocking`] when nothing is
    /// queued.
    ///
    /// # Errors
    /// The terminal error registered for the stream, or `Error::Timeout` when
    /// a blocking wait reaches its deadline.
    fn next_frame(&self, wait: Wait) -> Res<Option<StreamFrame>>;
}

/// Why [`FrameQueue::try_deliver`] refused a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliverError {
    /// The queue is at capacity. The frame is handed back.
    Full(StreamFrame),
    /// The stream already failed with this error.
    Terminated(Error),
}

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<StreamFrame>,
    /// Sticky; set once by the session.
    error: Option<Error>,
    /// The delivering side went away.
    closed: bool,
    /// The reader reached the end of the stream or failed, and will not pull
    /// again.
    finished: bool,
}

/// A bounded queue of inbound frames for one stream.
///
/// The session pushes with [`deliver`](Self::deliver), which blocks while the
/// queue is full. The reader pulls through [`FrameSource`]. A terminal error
/// recorded with [`fail`](Self::fail) wakes both sides. Frames queued before
/// the error are still handed out first. Once the reader is done with the
/// stream ([`finish`](Self::finish)), deliveries are accepted and dropped.
#[derive(Debug)]
pub struct FrameQueue {
    stream_id: StreamId,
    capacity: usize,
    state: Mutex<QueueState>,
    readable: Condvar,
    writable: Condvar,
}

impl FrameQueue {
    /// # Panics
    /// If `capacity` is zero.
    #[must_use]
    pub fn new(stream_id: StreamId, capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            stream_id,
            capacity,
            state: Mutex::new(QueueState::default()),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }

    /// Queue a frame, waiting for room if the queue is full.
    ///
    /// # Errors
    /// The stream's terminal error; the frame is dropped.
    pub fn deliver(&self, frame: StreamFrame) -> Res<()> {
        let mut state = self.state.lock();
        debug_assert!(!state.closed);
        loop {
            if let Some(err) = &state.error {
                return Err(err.clone());
            }
            if state.finished {
                qtrace!("[{}] reader finished, dropping {frame}", self.stream_id);
                return Ok(());
            }
            if state.frames.len() < self.capacity {
                break;
            }
            qtrace!("[{}] inbound queue full, waiting", self.stream_id);
            self.writable.wait(&mut state);
        }
        qtrace!("[{}] queued {frame}", self.stream_id);
        state.frames.push_back(frame);
        self.readable.notify_one();
        Ok(())
    }

    /// Queue a frame without waiting.
    ///
    /// # Errors
    /// `DeliverError::Full` with the frame if there is no room, or
    /// `DeliverError::Terminated` if the stream already failed.
    pub fn try_deliver(&self, frame: StreamFrame) -> Result<(), DeliverError> {
        let mut state = self.state.lock();
        debug_assert!(!state.closed);
        if let Some(err) = &state.error {
            return Err(DeliverError::Terminated(err.clone()));
        }
        if state.finished {
            qtrace!("[{}] reader finished, dropping {frame}", self.stream_id);
            return Ok(());
        }
        if state.frames.len() >= self.capacity {
            return Err(DeliverError::Full(frame));
        }
        qtrace!("[{}] queued {frame}", self.stream_id);
        state.frames.push_back(frame);
        self.readable.notify_one();
        Ok(())
    }

    /// Record a terminal error. Only the first one is kept.
    pub fn fail(&self, err: Error) {
        let mut state = self.state.lock();
        if state.error.is_none() {
            qdebug!("[{}] receive side failed: {err}", self.stream_id);
            state.error = Some(err);
        }
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// The reader needs no more frames. Anything queued is discarded, and a
    /// blocked `deliver` returns.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.finished = true;
        state.frames.clear();
        self.writable.notify_all();
    }

    /// The delivering side is gone. A reader that still needs frames after
    /// this, with neither an error nor the end of the stream seen, has hit a
    /// bug in the session.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.readable.notify_all();
    }

    #[must_use]
    pub fn error(&self) -> Option<Error> {
        self.state.lock().error.clone()
    }
}

impl FrameSource for FrameQueue {
    fn next_frame(&self, wait: Wait) -> Res<Option<StreamFrame>> {
        let mut state = self.state.lock();
        let mut timed_out = false;
        loop {
            if let Some(frame) = state.frames.pop_front() {
                self.writable.notify_one();
                return Ok(Some(frame));
            }
            if let Some(err) = &state.error {
                return Err(err.clone());
            }
            assert!(
                !state.closed,
                "FrameQueue {}: internal inconsistency: source closed without an error or FIN",
                self.stream_id
            );
            match wait {
                Wait::NonBlocking => return Ok(None),
                _ if timed_out => return Err(Error::Timeout),
                Wait::Blocking(None) => self.readable.wait(&mut state),
                Wait::Blocking(Some(deadline)) => {
                    timed_out = self.readable.wait_until(&mut state, deadline).timed_out();
                }
            }
        }
    }
}
