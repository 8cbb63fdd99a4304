// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// Building a stream of ordered bytes to give the application from a series of
// frames.

use std::{
    cmp::{max, min},
    fmt::{self, Display, Formatter},
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use qstream_common::{qdebug, qtrace};
use smallvec::SmallVec;

use crate::{
    frame::StreamFrame,
    inbound::{FrameQueue, FrameSource, Wait},
    stats::RecvStreamStats,
    stream_id::StreamId,
    Error, Res,
};

/// Reads larger than this are split up by `read_to_end`.
const READ_CHUNK: usize = 4096;

/// Out-of-order frames rarely pile up; keep a handful inline.
type PendingFrames = SmallVec<[StreamFrame; 8]>;

/// Puts frames back in order.
///
/// Frames ahead of the read offset wait in a small unordered buffer. The next
/// frame is looked for there first, then pulled from a [`FrameSource`] until it
/// shows up. The buffer is scanned linearly; the peer's flow-control window
/// bounds how much it can hold.
#[derive(Debug, Default)]
pub struct RxStreamOrderer {
    pending: PendingFrames,
    /// Number of bytes the application has read.
    retired: u64,
    /// Set by the first frame with FIN.
    final_size: Option<u64>,
    highest_seen: u64,
    stats: RecvStreamStats,
}

impl RxStreamOrderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the frame that starts at the read offset.
    ///
    /// # Errors
    /// Whatever `source` reports, or `Error::FinalSizeError` if a frame
    /// contradicts the final size of the stream.
    pub fn next_frame<S: FrameSource + ?Sized>(
        &mut self,
        source: &S,
        wait: Wait,
    ) -> Res<Option<StreamFrame>> {
        if let Some(frame) = self.take_pending() {
            return Ok(Some(frame));
        }

        loop {
            let Some(frame) = source.next_frame(wait)? else {
                return Ok(None);
            };
            if let Some(frame) = self.inbound_frame(frame)? {
                return Ok(Some(frame));
            }
        }
    }

    /// Process an incoming stream frame. The frame is returned if it starts at
    /// the read offset; otherwise it is buffered or, if it carries nothing
    /// new, dropped.
    ///
    /// # Errors
    /// `Error::FinalSizeError` if the frame contradicts the final size.
    pub fn inbound_frame(&mut self, mut frame: StreamFrame) -> Res<Option<StreamFrame>> {
        self.stats.frames_rx += 1;

        if frame.checked_end().is_none() {
            qdebug!("{frame} reaches past the largest stream offset");
            return Err(Error::FinalSizeError);
        }

        if frame.offset < self.retired && frame.end() <= self.retired {
            // Range already read by application, this frame is very late and unneeded.
            qtrace!("Dropping stale {frame}, read offset {}", self.retired);
            self.stats.stale_rx += 1;
            return Ok(None);
        }

        self.check_final_size(&frame)?;

        if frame.offset < self.retired {
            qtrace!("Trimming {frame} to read offset {}", self.retired);
            frame.trim_front(self.retired);
        }

        if frame.offset == self.retired {
            return Ok(Some(frame));
        }

        self.insert_pending(frame);
        Ok(None)
    }

    fn check_final_size(&mut self, frame: &StreamFrame) -> Res<()> {
        let new_end = frame.end();
        if let Some(final_size) = self.final_size {
            if new_end > final_size || (frame.fin && new_end != final_size) {
                qdebug!("{frame} conflicts with final size {final_size}");
                return Err(Error::FinalSizeError);
            }
        } else if frame.fin {
            if new_end < self.highest_seen {
                qdebug!("{frame} ends below data already seen at {}", self.highest_seen);
                return Err(Error::FinalSizeError);
            }
            self.final_size = Some(new_end);
        }
        self.highest_seen = max(self.highest_seen, new_end);
        Ok(())
    }

    /// Remove and return the buffered frame at the read offset, dropping
    /// anything that the read offset has overtaken on the way.
    fn take_pending(&mut self) -> Option<StreamFrame> {
        if self.pending.is_empty() {
            return None;
        }
        let retired = self.retired;
        let mut stale = 0;
        self.pending.retain(|f| {
            if f.offset < retired && f.end() <= retired {
                stale += 1;
                false
            } else {
                f.trim_front(retired);
                true
            }
        });
        self.stats.stale_rx += stale;

        let idx = self.pending.iter().position(|f| f.offset == retired)?;
        Some(self.pending.swap_remove(idx))
    }

    fn insert_pending(&mut self, frame: StreamFrame) {
        if let Some(existing) = self.pending.iter_mut().find(|f| f.offset == frame.offset) {
            self.stats.dups_rx += 1;
            // Keep whichever carries more.
            if frame.len() > existing.len() || (frame.len() == existing.len() && frame.fin) {
                qtrace!("{frame} replaces buffered {existing}");
                *existing = frame;
            } else {
                qtrace!("Dropping duplicate {frame}");
            }
            return;
        }

        qtrace!("Buffering {frame}, read offset {}", self.retired);
        self.stats.frames_reordered += 1;
        self.pending.push(frame);
        self.stats.max_pending = max(self.stats.max_pending, self.pending.len());
    }

    /// Account for `count` bytes handed to the application.
    pub fn retire(&mut self, count: usize) {
        self.retired += count as u64;
        self.stats.bytes_read += count as u64;
    }

    /// Bytes read by the application.
    #[must_use]
    pub const fn retired(&self) -> u64 {
        self.retired
    }

    /// Data bytes buffered ahead of the read offset.
    #[must_use]
    pub fn buffered(&self) -> u64 {
        self.pending.iter().map(|f| f.len() as u64).sum()
    }

    #[must_use]
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub const fn final_size(&self) -> Option<u64> {
        self.final_size
    }

    #[must_use]
    pub fn highest_seen_offset(&self) -> u64 {
        max(self.highest_seen, self.retired)
    }

    #[must_use]
    pub const fn stats(&self) -> &RecvStreamStats {
        &self.stats
    }
}

#[derive(Debug, PartialEq, Eq)]
enum RecvStreamState {
    Recv,
    DataRead { final_size: u64 },
    Failed { err: Error },
}

impl RecvStreamState {
    const fn name(&self) -> &str {
        match self {
            Self::Recv => "Recv",
            Self::DataRead { .. } => "DataRead",
            Self::Failed { .. } => "Failed",
        }
    }

    fn transition(&mut self, new_state: Self) {
        qtrace!("RecvStream state {} -> {}", self.name(), new_state.name());
        *self = new_state;
    }
}

/// The reading half of a stream.
///
/// Reads block until at least one byte is available, then return whatever is
/// contiguous without waiting for more. A short read with no error means
/// nothing else has arrived yet.
#[derive(Debug)]
pub struct RecvStream {
    stream_id: StreamId,
    source: Arc<FrameQueue>,
    orderer: RxStreamOrderer,
    /// The frame being drained, and how far into it we are.
    current: Option<StreamFrame>,
    read_pos: usize,
    state: RecvStreamState,
    read_timeout: Option<Duration>,
}

impl RecvStream {
    #[must_use]
    pub fn new(stream_id: StreamId, source: Arc<FrameQueue>, read_timeout: Option<Duration>) -> Self {
        Self {
            stream_id,
            source,
            orderer: RxStreamOrderer::new(),
            current: None,
            read_pos: 0,
            state: RecvStreamState::Recv,
            read_timeout,
        }
    }

    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Copy ordered stream data into `buf`. The returned flag is set once the
    /// end of the stream is reached; it comes with the last bytes of the
    /// stream and with every read after that.
    ///
    /// # Errors
    /// The stream's terminal error. If it arrives after some bytes were
    /// copied, those bytes are returned first and the error on the next call.
    /// `Error::Timeout` if the read timeout passes before any data arrives;
    /// the stream stays usable.
    pub fn read(&mut self, buf: &mut [u8]) -> Res<(usize, bool)> {
        match &self.state {
            RecvStreamState::DataRead { .. } => return Ok((0, true)),
            RecvStreamState::Failed { err } => return Err(err.clone()),
            RecvStreamState::Recv => {}
        }

        let deadline = self.read_timeout.map(|t| Instant::now() + t);
        let mut copied = 0;
        while copied < buf.len() {
            let frame = if let Some(frame) = self.current.take() {
                frame
            } else {
                // Only wait if we have nothing to give back yet.
                let wait = if copied == 0 {
                    Wait::Blocking(deadline)
                } else {
                    Wait::NonBlocking
                };
                match self.orderer.next_frame(&*self.source, wait) {
                    Ok(Some(frame)) => {
                        self.read_pos = 0;
                        frame
                    }
                    Ok(None) => break,
                    Err(err) if !err.is_terminal() => return Err(err),
                    Err(err) => {
                        self.source.finish();
                        self.state
                            .transition(RecvStreamState::Failed { err: err.clone() });
                        return if copied > 0 {
                            Ok((copied, false))
                        } else {
                            Err(err)
                        };
                    }
                }
            };

            let amount = min(buf.len() - copied, frame.len() - self.read_pos);
            buf[copied..copied + amount]
                .copy_from_slice(&frame.data[self.read_pos..self.read_pos + amount]);
            self.read_pos += amount;
            copied += amount;
            self.orderer.retire(amount);

            if self.read_pos < frame.len() {
                self.current = Some(frame);
            } else if frame.fin {
                let final_size = self.orderer.retired();
                qdebug!([self], "End of stream at {final_size}");
                self.source.finish();
                self.state
                    .transition(RecvStreamState::DataRead { final_size });
                return Ok((copied, true));
            }
        }

        Ok((copied, false))
    }

    /// Read exactly one byte.
    ///
    /// # Errors
    /// `Error::NoMoreData` at the end of the stream, otherwise as for `read`.
    pub fn read_byte(&mut self) -> Res<u8> {
        let mut b = [0; 1];
        match self.read(&mut b)? {
            (1, _) => Ok(b[0]),
            _ => Err(Error::NoMoreData),
        }
    }

    /// Append everything up to the end of the stream to `out`.
    ///
    /// # Errors
    /// As for `read`. Bytes read before the error stay in `out`.
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> Res<usize> {
        let mut chunk = [0; READ_CHUNK];
        let mut total = 0;
        loop {
            let (amount, fin) = self.read(&mut chunk)?;
            out.extend_from_slice(&chunk[..amount]);
            total += amount;
            if fin {
                return Ok(total);
            }
        }
    }

    /// Whether reading reached the end of the stream or failed for good.
    #[must_use]
    pub fn finished_reading(&self) -> bool {
        self.state != RecvStreamState::Recv
    }

    /// The size of the stream, once all of it has been read.
    #[must_use]
    pub const fn final_size(&self) -> Option<u64> {
        match self.state {
            RecvStreamState::DataRead { final_size } => Some(final_size),
            RecvStreamState::Recv | RecvStreamState::Failed { .. } => None,
        }
    }

    #[must_use]
    pub const fn orderer(&self) -> &RxStreamOrderer {
        &self.orderer
    }

    #[must_use]
    pub const fn stats(&self) -> &RecvStreamStats {
        self.orderer.stats()
    }
}

impl Display for RecvStream {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "RecvStream {}", self.stream_id)
    }
}

impl io::Read for RecvStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(Self::read(self, buf)?.0)
    }
}
