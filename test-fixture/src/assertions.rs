// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use qstream_transport::StreamFrame;

/// Check that frames handed to a sink follow on from each other with no gaps
/// or overlap, and that nothing follows a FIN. Returns the bytes they carry.
/// # Panics
/// If the frames are out of order.
#[must_use]
pub fn assert_contiguous(frames: &[StreamFrame]) -> Vec<u8> {
    let mut data = Vec::new();
    let mut fin_seen = false;
    for f in frames {
        assert!(!fin_seen, "{f} after FIN");
        assert_eq!(f.offset, data.len() as u64, "{f} out of order");
        data.extend_from_slice(&f.data);
        fin_seen = f.fin;
    }
    data
}

/// Check that the last frame is an empty FIN at `offset`.
/// # Panics
/// If it isn't.
pub fn assert_closed_at(frames: &[StreamFrame], offset: u64) {
    let last = frames.last().expect("at least one frame");
    assert!(last.fin, "{last} is not a FIN");
    assert!(last.is_empty(), "{last} carries data");
    assert_eq!(last.offset, offset);
}
