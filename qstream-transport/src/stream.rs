// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// A stream as the application sees it, and the handle the session keeps.

use std::{
    fmt::{self, Display, Formatter},
    io,
    sync::Arc,
};

use qstream_common::qdebug;

use crate::{
    fc::WindowGate,
    frame::StreamFrame,
    inbound::{DeliverError, FrameQueue},
    params::StreamParameters,
    recv_stream::RecvStream,
    send_stream::{FrameSink, SendStream},
    stream_id::StreamId,
    tparams::WindowParameters,
    Error, Res,
};

/// A bidirectional byte stream.
///
/// Reading and writing each need `&mut`; use [`into_split`](Self::into_split)
/// to drive them from different threads.
#[derive(Debug)]
pub struct Stream {
    recv: RecvStream,
    send: SendStream,
}

impl Stream {
    /// Create a stream and the handle the session uses to feed it.
    ///
    /// The initial send window comes from the peer's parameters, picked by
    /// the stream's type and by who opened it.
    ///
    /// # Errors
    /// `Error::TransportParameterError` if that window is not known.
    pub fn new(
        stream_id: StreamId,
        peer: &impl WindowParameters,
        sink: Arc<dyn FrameSink>,
        config: &StreamParameters,
    ) -> Res<(Self, StreamHandle)> {
        let window = peer.initial_send_window(stream_id, config.get_role())?;
        qdebug!(
            "[{stream_id}] New stream as {}, send window {window}",
            config.get_role()
        );

        let queue = Arc::new(FrameQueue::new(
            stream_id,
            config.get_inbound_queue_capacity(),
        ));
        let gate = Arc::new(WindowGate::new(stream_id, window));
        let stream = Self {
            recv: RecvStream::new(stream_id, Arc::clone(&queue), config.get_read_timeout()),
            send: SendStream::new(
                stream_id,
                sink,
                Arc::clone(&gate),
                config.get_write_timeout(),
            ),
        };
        let handle = StreamHandle {
            stream_id,
            queue,
            gate,
        };
        Ok((stream, handle))
    }

    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.recv.stream_id()
    }

    /// See [`RecvStream::read`].
    ///
    /// # Errors
    /// As for [`RecvStream::read`].
    pub fn read(&mut self, buf: &mut [u8]) -> Res<(usize, bool)> {
        self.recv.read(buf)
    }

    /// # Errors
    /// As for [`RecvStream::read_byte`].
    pub fn read_byte(&mut self) -> Res<u8> {
        self.recv.read_byte()
    }

    /// # Errors
    /// As for [`RecvStream::read_to_end`].
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> Res<usize> {
        self.recv.read_to_end(out)
    }

    /// See [`SendStream::send`].
    ///
    /// # Errors
    /// As for [`SendStream::send`].
    pub fn send(&mut self, buf: &[u8]) -> Res<usize> {
        self.send.send(buf)
    }

    /// # Errors
    /// As for [`SendStream::close`].
    pub fn close(&mut self) -> Res<()> {
        self.send.close()
    }

    #[must_use]
    pub const fn recv_stream(&self) -> &RecvStream {
        &self.recv
    }

    #[must_use]
    pub const fn send_stream(&self) -> &SendStream {
        &self.send
    }

    #[must_use]
    pub fn into_split(self) -> (RecvStream, SendStream) {
        (self.recv, self.send)
    }
}

impl Display for Stream {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Stream {}", self.stream_id())
    }
}

impl io::Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.recv, buf)
    }
}

impl io::Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut self.send, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The session's side of a stream: it delivers inbound frames, grows the
/// send window and reports errors. Dropping it tells the reader that no more
/// frames will come, so the session should only do that once the stream has
/// ended or an error was registered.
#[derive(Debug)]
pub struct StreamHandle {
    stream_id: StreamId,
    queue: Arc<FrameQueue>,
    gate: Arc<WindowGate>,
}

impl StreamHandle {
    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Hand an inbound frame to the reader, waiting while its queue is full.
    ///
    /// # Errors
    /// The stream's terminal error, if one was registered.
    pub fn deliver(&self, frame: StreamFrame) -> Res<()> {
        debug_assert_eq!(frame.stream_id, self.stream_id);
        self.queue.deliver(frame)
    }

    /// Like [`deliver`](Self::deliver), without waiting.
    ///
    /// # Errors
    /// `DeliverError::Full` hands the frame back if the queue is full.
    pub fn try_deliver(&self, frame: StreamFrame) -> Result<(), DeliverError> {
        debug_assert_eq!(frame.stream_id, self.stream_id);
        self.queue.try_deliver(frame)
    }

    /// Apply a MAX_STREAM_DATA update. Returns `true` if the window grew.
    pub fn update_window(&self, limit: u64) -> bool {
        self.gate.update(limit)
    }

    /// End the stream with `err` in both directions, waking anything that is
    /// blocked on it. Only the first error sticks.
    pub fn register_error(&self, err: Error) {
        qdebug!("[{}] Registering {err}", self.stream_id);
        // The gate picks the winner, so both directions see the same error
        // even when sessions race to register.
        let kept = self.gate.fail(err);
        self.queue.fail(kept);
    }

    #[must_use]
    pub fn error(&self) -> Option<Error> {
        self.gate.error()
    }

    /// The send window, as last extended.
    #[must_use]
    pub fn send_window(&self) -> u64 {
        self.gate.limit()
    }

    /// The limit to report in a STREAM_DATA_BLOCKED frame, if one is due.
    #[must_use]
    pub fn blocked_needed(&self) -> Option<u64> {
        self.gate.blocked_needed()
    }

    pub fn blocked_sent(&self) {
        self.gate.blocked_sent();
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.queue.close();
    }
}
