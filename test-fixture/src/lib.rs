// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use qstream_common::Role;
use qstream_transport::{
    Error, FrameSink, Res, Stream, StreamFrame, StreamHandle, StreamId, StreamParameters,
    TransportParameterId, TransportParameters,
};

pub mod assertions;

/// Initialize the test fixture.  Only call this if you aren't also calling a
/// fixture function that depends on setup.  Other functions in the fixture
/// that depend on this setup call the function for you.
pub fn fixture_init() {
    qstream_common::log::init(None);
}

/// A client-initiated bidirectional stream.
pub const DEFAULT_STREAM_ID: StreamId = StreamId::new(0);

/// How long tests are prepared to wait for another thread to get stuck.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// A frame sink that keeps everything it is given, and can be told to start
/// refusing frames.
#[derive(Debug, Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<StreamFrame>>,
    reject: Mutex<Option<Error>>,
}

impl RecordingSink {
    #[must_use]
    pub fn frames(&self) -> Vec<StreamFrame> {
        self.frames.lock().clone()
    }

    /// Refuse every frame from now on with `err`.
    pub fn reject_with(&self, err: Error) {
        *self.reject.lock() = Some(err);
    }
}

impl FrameSink for RecordingSink {
    fn enqueue(&self, frame: StreamFrame) -> Res<()> {
        if let Some(err) = self.reject.lock().clone() {
            return Err(err);
        }
        self.frames.lock().push(frame);
        Ok(())
    }
}

/// Peer transport parameters that give every kind of stream `window` bytes of
/// initial credit.
#[must_use]
pub fn peer_params(window: u64) -> TransportParameters {
    let mut tps = TransportParameters::default();
    for id in [
        TransportParameterId::InitialMaxStreamDataBidiLocal,
        TransportParameterId::InitialMaxStreamDataBidiRemote,
        TransportParameterId::InitialMaxStreamDataUni,
    ] {
        tps.set_integer(id, window);
    }
    tps
}

/// Create a client stream with the given initial send window.
#[must_use]
pub fn new_stream(window: u64) -> (Stream, StreamHandle, Arc<RecordingSink>) {
    new_stream_with(window, &StreamParameters::default().role(Role::Client))
}

/// # Panics
/// If the stream cannot be created.
#[must_use]
pub fn new_stream_with(
    window: u64,
    config: &StreamParameters,
) -> (Stream, StreamHandle, Arc<RecordingSink>) {
    fixture_init();
    let sink = Arc::new(RecordingSink::default());
    let (stream, handle) = Stream::new(
        DEFAULT_STREAM_ID,
        &peer_params(window),
        Arc::clone(&sink) as Arc<dyn FrameSink>,
        config,
    )
    .unwrap();
    (stream, handle, sink)
}

#[must_use]
pub fn frame(offset: u64, data: &[u8], fin: bool) -> StreamFrame {
    StreamFrame::new(DEFAULT_STREAM_ID, offset, data.to_vec(), fin)
}

/// Cut `data` into frames of at most `chunk` bytes, the last one with FIN.
///
/// # Panics
/// If `chunk` is zero.
#[must_use]
pub fn split_frames(data: &[u8], chunk: usize) -> Vec<StreamFrame> {
    assert!(chunk > 0);
    let mut frames: Vec<_> = data
        .chunks(chunk)
        .scan(0, |offset, c| {
            let f = frame(*offset, c, false);
            *offset += c.len() as u64;
            Some(f)
        })
        .collect();
    match frames.last_mut() {
        Some(last) => last.fin = true,
        None => frames.push(frame(0, &[], true)),
    }
    frames
}

/// Call `f` with every ordering of `items` (Heap's algorithm).
pub fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(&[T])) {
    let mut items = items.to_vec();
    let mut c = vec![0; items.len()];
    f(&items);
    let mut i = 0;
    while i < items.len() {
        if c[i] < i {
            if i % 2 == 0 {
                items.swap(0, i);
            } else {
                items.swap(c[i], i);
            }
            f(&items);
            c[i] += 1;
            i = 0;
        } else {
            c[i] = 0;
            i += 1;
        }
    }
}

/// Spin until `cond` holds, so that a test can be sure another thread got as
/// far as blocking.
///
/// # Panics
/// If that takes longer than [`PATIENCE`].
pub fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + PATIENCE;
    while !cond() {
        assert!(Instant::now() < deadline, "gave up waiting");
        thread::yield_now();
    }
}
