// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// Tracking of some useful statistics.

use std::fmt::{self, Display, Formatter};

/// Receive side statistics
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvStreamStats {
    /// Frames pulled from the inbound queue.
    pub frames_rx: u64,
    /// Frames that arrived ahead of the read offset and had to wait.
    pub frames_reordered: u64,
    /// Frames that only carried bytes already delivered.
    pub stale_rx: u64,
    /// Frames dropped because another frame already held their offset.
    pub dups_rx: u64,
    /// Largest number of frames waiting at once.
    pub max_pending: usize,
    /// Bytes handed to the application.
    pub bytes_read: u64,
}

impl Display for RecvStreamStats {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "rx: {} reordered: {} stale: {} dup: {} max_pending: {} read: {}",
            self.frames_rx,
            self.frames_reordered,
            self.stale_rx,
            self.dups_rx,
            self.max_pending,
            self.bytes_read
        )
    }
}

/// Send side statistics
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendStreamStats {
    /// Frames accepted by the sink, including the final one.
    pub frames_tx: u64,
    /// Bytes accepted by the sink.
    pub bytes_tx: u64,
    /// Times a write waited for flow control credit.
    pub blocked: u64,
}

impl Display for SendStreamStats {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "tx: {} bytes: {} blocked: {}",
            self.frames_tx, self.bytes_tx, self.blocked
        )
    }
}
