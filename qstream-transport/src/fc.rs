// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// Send-side flow control for a stream: the credit accounting and the monitor
// that parks writers until the peer extends the window.

use std::{fmt::Debug, time::Instant};

use parking_lot::{Condvar, Mutex};
use qstream_common::{qdebug, qtrace};

use crate::{stream_id::StreamId, Error, Res};

/// The largest usable limit. `blocked_at` is kept one above the limit, so
/// larger values are clamped to this.
const MAX_LIMIT: u64 = u64::MAX - 1;

#[derive(Debug)]
pub struct SenderFlowControl<T>
where
    T: Debug + Sized,
{
    /// The thing that we're counting for.
    subject: T,
    /// The limit.
    limit: u64,
    /// How much of that limit we've used.
    used: u64,
    /// The point at which blocking occurred.  This is updated each time
    /// the sender decides that it is blocked.  It only ever changes
    /// when blocking occurs.  This ensures that blocking at any given limit
    /// is only reported once.
    /// Note: All values are one greater than the corresponding `limit` to
    /// allow distinguishing between blocking at a limit of 0 and no blocking.
    blocked_at: u64,
    /// Whether a blocked signal should be sent.
    blocked_frame: bool,
}

impl<T> SenderFlowControl<T>
where
    T: Debug + Sized,
{
    /// Make a new instance with the initial value and subject.
    pub const fn new(subject: T, initial: u64) -> Self {
        Self {
            subject,
            limit: if initial > MAX_LIMIT { MAX_LIMIT } else { initial },
            used: 0,
            blocked_at: 0,
            blocked_frame: false,
        }
    }

    pub const fn subject(&self) -> &T {
        &self.subject
    }

    /// Update the maximum.  Returns `true` if the change was an increase.
    pub fn update(&mut self, limit: u64) -> bool {
        let limit = limit.min(MAX_LIMIT);
        if limit > self.limit {
            self.limit = limit;
            self.blocked_frame = false;
            true
        } else {
            false
        }
    }

    /// Consume flow control.
    pub fn consume(&mut self, count: usize) {
        let amt = count as u64;
        debug_assert!(self.used + amt <= self.limit);
        self.used += amt;
    }

    /// Get available flow control.
    pub fn available(&self) -> usize {
        usize::try_from(self.limit - self.used).unwrap_or(usize::MAX)
    }

    /// How much data has been written.
    pub const fn used(&self) -> u64 {
        self.used
    }

    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Mark flow control as blocked.
    /// This only does something if the current limit exceeds the last reported blocking limit.
    pub fn blocked(&mut self) {
        if self.limit >= self.blocked_at {
            self.blocked_at = self.limit + 1;
            self.blocked_frame = true;
        }
    }

    /// Return whether a blocked signal needs to be sent.
    /// This is `Some` with the active limit if `blocked` has been called,
    /// if a blocked signal has not been sent, and if the blocking condition
    /// remains.
    pub const fn blocked_needed(&self) -> Option<u64> {
        if self.blocked_frame && self.limit < self.blocked_at {
            Some(self.blocked_at - 1)
        } else {
            None
        }
    }

    /// Clear the need to send a blocked signal.
    pub fn blocked_sent(&mut self) {
        self.blocked_frame = false;
    }
}

#[derive(Debug)]
struct GateState {
    fc: SenderFlowControl<StreamId>,
    /// Sticky; once set, every reservation fails with it.
    error: Option<Error>,
    /// How many times a reservation had to wait.
    blocked_count: u64,
}

/// The flow-control gate for one stream.
///
/// The writer asks for credit with [`reserve`](Self::reserve), emits the
/// bytes, then accounts for them with [`consume`](Self::consume). The session
/// extends the window with [`update`](Self::update) and ends the stream with
/// [`fail`](Self::fail); both wake parked writers. The window is only ever
/// read and waited on under the same lock that the wakeups use.
#[derive(Debug)]
pub struct WindowGate {
    state: Mutex<GateState>,
    updated: Condvar,
}

impl WindowGate {
    #[must_use]
    pub fn new(stream_id: StreamId, initial: u64) -> Self {
        Self {
            state: Mutex::new(GateState {
                fc: SenderFlowControl::new(stream_id, initial),
                error: None,
                blocked_count: 0,
            }),
            updated: Condvar::new(),
        }
    }

    /// Grow the window to `limit`. Smaller or equal values are ignored, so
    /// reordered window updates are harmless. Returns `true` if the window
    /// grew.
    pub fn update(&self, limit: u64) -> bool {
        let mut state = self.state.lock();
        let grew = state.fc.update(limit);
        if grew {
            qtrace!("[{}] window now {limit}", state.fc.subject());
            self.updated.notify_all();
        }
        grew
    }

    /// Wait for credit and grant up to `requested` bytes of it. The grant is
    /// not consumed; call [`consume`](Self::consume) once the bytes are out.
    ///
    /// # Errors
    /// The terminal error, if one was registered before or while waiting.
    /// `Error::Timeout` if `deadline` passes with the window still exhausted.
    pub fn reserve(&self, requested: usize, deadline: Option<Instant>) -> Res<usize> {
        let mut state = self.state.lock();
        loop {
            if let Some(err) = &state.error {
                return Err(err.clone());
            }
            let available = state.fc.available();
            if available > 0 || requested == 0 {
                return Ok(requested.min(available));
            }

            state.fc.blocked();
            state.blocked_count += 1;
            qdebug!(
                "[{}] blocked by flow control at {}",
                state.fc.subject(),
                state.fc.limit()
            );
            match deadline {
                None => self.updated.wait(&mut state),
                Some(deadline) => {
                    if self.updated.wait_until(&mut state, deadline).timed_out()
                        && state.error.is_none()
                        && state.fc.available() == 0
                    {
                        return Err(Error::Timeout);
                    }
                }
            }
        }
    }

    /// Account for `count` bytes handed to the sink.
    pub fn consume(&self, count: usize) {
        self.state.lock().fc.consume(count);
    }

    /// Record a terminal error and wake every waiting writer. Only the first
    /// error is kept; that one is returned.
    pub fn fail(&self, err: Error) -> Error {
        let mut state = self.state.lock();
        let kept = match state.error.clone() {
            Some(kept) => kept,
            None => {
                qdebug!("[{}] send side failed: {err}", state.fc.subject());
                state.error = Some(err.clone());
                err
            }
        };
        self.updated.notify_all();
        kept
    }

    #[must_use]
    pub fn error(&self) -> Option<Error> {
        self.state.lock().error.clone()
    }

    /// The current window.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.state.lock().fc.limit()
    }

    /// The write offset: everything below it has been handed to the sink.
    #[must_use]
    pub fn used(&self) -> u64 {
        self.state.lock().fc.used()
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.state.lock().fc.available()
    }

    #[must_use]
    pub fn blocked_count(&self) -> u64 {
        self.state.lock().blocked_count
    }

    /// The limit at which a STREAM_DATA_BLOCKED signal is due, if any.
    #[must_use]
    pub fn blocked_needed(&self) -> Option<u64> {
        self.state.lock().fc.blocked_needed()
    }

    pub fn blocked_sent(&self) {
        self.state.lock().fc.blocked_sent();
    }
}
