// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// The stream frame as seen by a single stream. Encoding it is the session's
// business.

use crate::stream_id::StreamId;

/// A contiguous range of stream data starting at `offset`. A frame with `fin`
/// set ends the stream at `offset + data.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub stream_id: StreamId,
    pub offset: u64,
    pub data: Vec<u8>,
    pub fin: bool,
}

impl StreamFrame {
    #[must_use]
    pub const fn new(stream_id: StreamId, offset: u64, data: Vec<u8>, fin: bool) -> Self {
        Self {
            stream_id,
            offset,
            data,
            fin,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The offset one past the last byte of this frame. Saturates; see
    /// [`checked_end`](Self::checked_end).
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.data.len() as u64)
    }

    /// `None` if the frame reaches past the largest stream offset.
    #[must_use]
    pub fn checked_end(&self) -> Option<u64> {
        self.offset.checked_add(self.data.len() as u64)
    }

    /// Drop the bytes before `offset`. Does nothing if the frame starts at or
    /// after `offset`.
    pub(crate) fn trim_front(&mut self, offset: u64) {
        if offset <= self.offset {
            return;
        }
        let skip = usize::try_from(offset - self.offset)
            .unwrap_or(usize::MAX)
            .min(self.data.len());
        self.data.drain(..skip);
        self.offset += skip as u64;
    }
}

impl ::std::fmt::Display for StreamFrame {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        write!(
            f,
            "STREAM {} {}-{}{}",
            self.stream_id,
            self.offset,
            self.end(),
            if self.fin { " fin" } else { "" }
        )
    }
}
