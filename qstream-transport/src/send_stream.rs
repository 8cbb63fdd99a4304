// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// Cutting application writes into stream frames that fit the peer's
// flow-control window.

use std::{
    fmt::{self, Debug, Display, Formatter},
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use qstream_common::{qdebug, qtrace};

use crate::{
    fc::WindowGate, frame::StreamFrame, stats::SendStreamStats, stream_id::StreamId, Error, Res,
};

/// Where outgoing frames go. Typically the session's send queue.
pub trait FrameSink: Debug + Send + Sync {
    /// Take ownership of a frame for transmission.
    ///
    /// # Errors
    /// If the frame cannot be accepted. The stream reports the error to the
    /// writer and does not count the frame as sent.
    fn enqueue(&self, frame: StreamFrame) -> Res<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendStreamState {
    Open,
    Closed { final_size: u64 },
}

impl SendStreamState {
    const fn name(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closed { .. } => "Closed",
        }
    }

    fn transition(&mut self, new_state: Self) {
        qtrace!("SendStream state {} -> {}", self.name(), new_state.name());
        *self = new_state;
    }
}

/// The writing half of a stream.
#[derive(Debug)]
pub struct SendStream {
    stream_id: StreamId,
    sink: Arc<dyn FrameSink>,
    gate: Arc<WindowGate>,
    state: SendStreamState,
    write_timeout: Option<Duration>,
    stats: SendStreamStats,
}

impl SendStream {
    #[must_use]
    pub fn new(
        stream_id: StreamId,
        sink: Arc<dyn FrameSink>,
        gate: Arc<WindowGate>,
        write_timeout: Option<Duration>,
    ) -> Self {
        Self {
            stream_id,
            sink,
            gate,
            state: SendStreamState::Open,
            write_timeout,
            stats: SendStreamStats::default(),
        }
    }

    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Write all of `buf`, waiting for flow control credit as needed. Each
    /// grant of credit becomes one frame.
    ///
    /// # Errors
    /// The stream's terminal error, whatever the sink returns, or
    /// `Error::FinalSizeError` after `close`. Frames already handed to the
    /// sink stay sent and are counted by `write_offset`.
    /// `Error::Timeout` if the write timeout passes before any byte could be
    /// sent; a timeout after some progress is a short write instead.
    pub fn send(&mut self, buf: &[u8]) -> Res<usize> {
        if let Some(err) = self.gate.error() {
            return Err(err);
        }
        if let SendStreamState::Closed { final_size } = self.state {
            qdebug!([self], "Write after close at {final_size}");
            return Err(Error::FinalSizeError);
        }

        let deadline = self.write_timeout.map(|t| Instant::now() + t);
        let mut sent = 0;
        while sent < buf.len() {
            let amount = match self.gate.reserve(buf.len() - sent, deadline) {
                Ok(amount) => amount,
                Err(Error::Timeout) if sent > 0 => break,
                Err(err) => return Err(err),
            };
            let frame = StreamFrame::new(
                self.stream_id,
                self.gate.used(),
                buf[sent..sent + amount].to_vec(),
                false,
            );
            qtrace!([self], "Sending {frame}");
            self.sink.enqueue(frame)?;
            self.gate.consume(amount);
            self.stats.frames_tx += 1;
            self.stats.bytes_tx += amount as u64;
            sent += amount;
        }
        Ok(sent)
    }

    /// End the stream. The final frame is sent even if the window is
    /// exhausted, since it carries no data.
    ///
    /// # Errors
    /// The stream's terminal error, or whatever the sink returns.
    pub fn close(&mut self) -> Res<()> {
        if let Some(err) = self.gate.error() {
            return Err(err);
        }
        if matches!(self.state, SendStreamState::Closed { .. }) {
            return Ok(());
        }

        let final_size = self.gate.used();
        let frame = StreamFrame::new(self.stream_id, final_size, Vec::new(), true);
        qdebug!([self], "Closing with {frame}");
        self.sink.enqueue(frame)?;
        self.stats.frames_tx += 1;
        self.state.transition(SendStreamState::Closed { final_size });
        Ok(())
    }

    /// The offset of the next byte to be written.
    #[must_use]
    pub fn write_offset(&self) -> u64 {
        self.gate.used()
    }

    /// Bytes that may be sent right now without waiting.
    #[must_use]
    pub fn avail(&self) -> usize {
        self.gate.available()
    }

    #[must_use]
    pub const fn final_size(&self) -> Option<u64> {
        match self.state {
            SendStreamState::Closed { final_size } => Some(final_size),
            SendStreamState::Open => None,
        }
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.state, SendStreamState::Closed { .. })
    }

    #[must_use]
    pub fn stats(&self) -> SendStreamStats {
        SendStreamStats {
            blocked: self.gate.blocked_count(),
            ..self.stats
        }
    }
}

impl Display for SendStream {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "SendStream {}", self.stream_id)
    }
}

impl io::Write for SendStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.send(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write as _, sync::Arc, thread, time::Duration};

    use parking_lot::Mutex;

    use super::{FrameSink, SendStream};
    use crate::{fc::WindowGate, frame::StreamFrame, stream_id::StreamId, Error, Res};

    const ID: StreamId = StreamId::new(2);

    #[derive(Debug, Default)]
    struct Sink {
        frames: Mutex<Vec<StreamFrame>>,
        reject: Mutex<Option<Error>>,
    }

    impl Sink {
        fn frames(&self) -> Vec<StreamFrame> {
            self.frames.lock().clone()
        }
    }

    impl FrameSink for Sink {
        fn enqueue(&self, frame: StreamFrame) -> Res<()> {
            if let Some(err) = self.reject.lock().clone() {
                return Err(err);
            }
            self.frames.lock().push(frame);
            Ok(())
        }
    }

    fn send_stream(window: u64) -> (Arc<Sink>, Arc<WindowGate>, SendStream) {
        let sink = Arc::new(Sink::default());
        let gate = Arc::new(WindowGate::new(ID, window));
        let s = SendStream::new(
            ID,
            Arc::clone(&sink) as Arc<dyn FrameSink>,
            Arc::clone(&gate),
            None,
        );
        (sink, gate, s)
    }

    #[test]
    fn one_frame_per_grant() {
        let (sink, _gate, mut s) = send_stream(100);
        assert_eq!(s.send(b"hello"), Ok(5));
        assert_eq!(s.send(b" world"), Ok(6));
        assert_eq!(
            sink.frames(),
            vec![
                StreamFrame::new(ID, 0, b"hello".to_vec(), false),
                StreamFrame::new(ID, 5, b" world".to_vec(), false),
            ]
        );
        assert_eq!(s.write_offset(), 11);
        assert_eq!(s.avail(), 89);
        assert_eq!(s.stats().frames_tx, 2);
        assert_eq!(s.stats().bytes_tx, 11);
    }

    #[test]
    fn empty_write() {
        let (sink, _gate, mut s) = send_stream(0);
        assert_eq!(s.send(&[]), Ok(0));
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn blocked_write_resumes() {
        let (sink, gate, mut s) = send_stream(10);
        let writer = thread::spawn(move || {
            let res = s.send(&[7; 20]);
            (res, s)
        });
        while gate.blocked_count() == 0 {
            thread::yield_now();
        }
        assert_eq!(gate.used(), 10);
        assert_eq!(gate.blocked_needed(), Some(10));
        gate.update(20);
        let (res, s) = writer.join().unwrap();
        assert_eq!(res, Ok(20));
        let frames = sink.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!((frames[1].offset, frames[1].len()), (10, 10));
        assert_eq!(s.stats().blocked, 1);
    }

    #[test]
    fn close_with_exhausted_window() {
        let (sink, _gate, mut s) = send_stream(3);
        assert_eq!(s.send(b"abc"), Ok(3));
        s.close().unwrap();
        assert_eq!(
            sink.frames().last(),
            Some(&StreamFrame::new(ID, 3, Vec::new(), true))
        );
        assert_eq!(s.final_size(), Some(3));

        // Once only.
        s.close().unwrap();
        assert_eq!(sink.frames().len(), 2);
        assert_eq!(s.send(b"d"), Err(Error::FinalSizeError));
    }

    #[test]
    fn sink_rejection() {
        let (sink, gate, mut s) = send_stream(4);
        let writer = thread::spawn(move || {
            let res = s.send(b"abcdefgh");
            (res, s)
        });
        while gate.blocked_count() == 0 {
            thread::yield_now();
        }
        *sink.reject.lock() = Some(Error::ConnectionClosed);
        gate.update(8);
        let (res, s) = writer.join().unwrap();
        assert_eq!(res, Err(Error::ConnectionClosed));
        // The first chunk made it out.
        assert_eq!(s.write_offset(), 4);
        assert_eq!(sink.frames().len(), 1);
    }

    #[test]
    fn terminal_error() {
        let (sink, gate, mut s) = send_stream(10);
        gate.fail(Error::StreamReset(4));
        assert_eq!(s.send(b"x"), Err(Error::StreamReset(4)));
        assert_eq!(s.close(), Err(Error::StreamReset(4)));
        assert!(!s.is_closed());
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn timeout() {
        let sink = Arc::new(Sink::default());
        let gate = Arc::new(WindowGate::new(ID, 2));
        let mut s = SendStream::new(
            ID,
            Arc::clone(&sink) as Arc<dyn FrameSink>,
            Arc::clone(&gate),
            Some(Duration::from_millis(10)),
        );
        // Progress turns the timeout into a short write.
        assert_eq!(s.send(b"abcd"), Ok(2));
        assert_eq!(s.send(b"cd"), Err(Error::Timeout));
        gate.update(4);
        assert_eq!(s.send(b"cd"), Ok(2));
        assert_eq!(s.write_offset(), 4);
    }

    #[test]
    fn io_write() {
        let (sink, _gate, mut s) = send_stream(100);
        write!(s, "{}-{}", 1, 2).unwrap();
        s.flush().unwrap();
        let data: Vec<u8> = sink.frames().into_iter().flat_map(|f| f.data).collect();
        assert_eq!(data, b"1-2");
    }
}
