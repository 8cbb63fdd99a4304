// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{thread, time::Duration};

use qstream_common::Role;
use qstream_transport::{DeliverError, Error, StreamParameters};
use test_fixture::{
    assertions::{assert_closed_at, assert_contiguous},
    frame, new_stream, new_stream_with, wait_for,
};

#[test]
fn hello_there_world() {
    let (mut stream, handle, _sink) = new_stream(100);
    handle.deliver(frame(10, b"WORLD", true)).unwrap();
    handle.deliver(frame(0, b"HELLO", false)).unwrap();
    handle.deliver(frame(5, b"THERE", false)).unwrap();

    let mut buf = [0; 64];
    let (n, fin) = stream.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"HELLOTHEREWORLD");
    assert!(fin);
    assert_eq!(stream.read(&mut buf), Ok((0, true)));
}

#[test]
fn blocked_write_resumes_on_window_update() {
    let (stream, handle, sink) = new_stream(10);
    let (_recv, mut send) = stream.into_split();

    let writer = thread::spawn(move || send.send(&[0x5a; 20]));
    wait_for(|| handle.blocked_needed().is_some());
    assert_eq!(handle.blocked_needed(), Some(10));
    assert_eq!(assert_contiguous(&sink.frames()).len(), 10);

    assert!(handle.update_window(20));
    assert_eq!(writer.join().unwrap(), Ok(20));
    let data = assert_contiguous(&sink.frames());
    assert_eq!(data, vec![0x5a; 20]);
    assert_eq!(handle.blocked_needed(), None);
}

#[test]
fn stale_window_updates_ignored() {
    let (stream, handle, _sink) = new_stream(10);
    assert!(!handle.update_window(5));
    assert!(!handle.update_window(10));
    assert_eq!(handle.send_window(), 10);
    assert!(handle.update_window(30));
    assert!(!handle.update_window(25));
    assert_eq!(handle.send_window(), 30);
    assert_eq!(stream.send_stream().avail(), 30);
}

#[test]
fn largest_window_update() {
    let (mut stream, handle, sink) = new_stream(10);
    assert!(handle.update_window(u64::MAX));
    assert!(!handle.update_window(u64::MAX));
    assert_eq!(stream.send(&[1; 100]), Ok(100));
    assert_eq!(assert_contiguous(&sink.frames()).len(), 100);
}

#[test]
fn close_with_window_exhausted() {
    let (mut stream, _handle, sink) = new_stream(4);
    assert_eq!(stream.send(b"full"), Ok(4));
    assert_eq!(stream.send_stream().avail(), 0);
    stream.close().unwrap();
    let frames = sink.frames();
    assert_closed_at(&frames, 4);
    assert_eq!(assert_contiguous(&frames), b"full");
}

#[test]
fn registered_error_wakes_reader_and_writer() {
    let (stream, handle, _sink) = new_stream(0);
    let (mut recv, mut send) = stream.into_split();

    let reader = thread::spawn(move || {
        let mut buf = [0; 8];
        recv.read(&mut buf)
    });
    let writer = thread::spawn(move || send.send(b"blocked"));
    wait_for(|| handle.blocked_needed().is_some());

    handle.register_error(Error::StreamReset(77));
    assert_eq!(reader.join().unwrap(), Err(Error::StreamReset(77)));
    assert_eq!(writer.join().unwrap(), Err(Error::StreamReset(77)));
}

#[test]
fn racing_errors_agree() {
    for _ in 0..200 {
        let (stream, handle, _sink) = new_stream(0);
        let (mut recv, mut send) = stream.into_split();
        thread::scope(|s| {
            s.spawn(|| handle.register_error(Error::StreamReset(1)));
            s.spawn(|| handle.register_error(Error::ConnectionError(2)));
        });
        let read_err = recv.read(&mut [0; 4]).unwrap_err();
        let write_err = send.send(b"x").unwrap_err();
        assert_eq!(read_err, write_err);
        assert_eq!(handle.error(), Some(read_err));
    }
}

#[test]
fn retransmissions_after_end_do_not_block() {
    let config = StreamParameters::default().inbound_queue_capacity(1);
    let (mut stream, handle, _sink) = new_stream_with(10, &config);
    handle.deliver(frame(0, b"end", true)).unwrap();
    let mut out = Vec::new();
    assert_eq!(stream.read_to_end(&mut out), Ok(3));
    for _ in 0..10 {
        handle.deliver(frame(0, b"end", true)).unwrap();
    }
    assert_eq!(handle.try_deliver(frame(0, b"end", true)), Ok(()));
}

#[test]
fn registered_error_wakes_delivery() {
    let config = StreamParameters::default().inbound_queue_capacity(1);
    let (_stream, handle, _sink) = new_stream_with(10, &config);
    handle.deliver(frame(0, b"a", false)).unwrap();
    assert_eq!(
        handle.try_deliver(frame(1, b"b", false)),
        Err(DeliverError::Full(frame(1, b"b", false)))
    );

    thread::scope(|s| {
        let session = s.spawn(|| handle.deliver(frame(1, b"b", false)));
        thread::sleep(Duration::from_millis(10));
        handle.register_error(Error::ConnectionClosed);
        assert_eq!(session.join().unwrap(), Err(Error::ConnectionClosed));
    });
}

#[test]
fn reader_keeps_data_received_before_error() {
    let (mut stream, handle, _sink) = new_stream(10);
    handle.deliver(frame(0, b"partial", false)).unwrap();
    handle.register_error(Error::ConnectionError(1));

    let mut out = Vec::new();
    assert_eq!(
        stream.read_to_end(&mut out),
        Err(Error::ConnectionError(1))
    );
    assert_eq!(out, b"partial");
    assert!(stream.recv_stream().finished_reading());
}

#[test]
fn read_timeout_then_data() {
    let config = StreamParameters::default()
        .role(Role::Server)
        .read_timeout(Some(Duration::from_millis(10)));
    let (mut stream, handle, _sink) = new_stream_with(10, &config);
    let mut buf = [0; 8];
    assert_eq!(stream.read(&mut buf), Err(Error::Timeout));

    handle.deliver(frame(0, b"late", true)).unwrap();
    assert_eq!(stream.read(&mut buf), Ok((4, true)));
}

#[test]
fn write_timeout_then_window() {
    let config = StreamParameters::default().write_timeout(Some(Duration::from_millis(10)));
    let (mut stream, handle, sink) = new_stream_with(0, &config);
    assert_eq!(stream.send(b"x"), Err(Error::Timeout));
    assert!(handle.error().is_none());

    handle.update_window(1);
    assert_eq!(stream.send(b"x"), Ok(1));
    assert_eq!(assert_contiguous(&sink.frames()), b"x");
}

#[test]
fn sink_failure_is_local_to_writer() {
    let (mut stream, handle, sink) = new_stream(10);
    assert_eq!(stream.send(b"ok"), Ok(2));
    sink.reject_with(Error::ConnectionClosed);
    assert_eq!(stream.send(b"no"), Err(Error::ConnectionClosed));
    assert_eq!(stream.send_stream().write_offset(), 2);

    // The receive side is unaffected.
    handle.deliver(frame(0, b"in", true)).unwrap();
    let mut out = Vec::new();
    assert_eq!(stream.read_to_end(&mut out), Ok(2));
}

#[test]
fn stats() {
    let (mut stream, handle, _sink) = new_stream(10);
    handle.deliver(frame(3, b"def", true)).unwrap();
    handle.deliver(frame(0, b"abc", false)).unwrap();
    handle.deliver(frame(0, b"abc", false)).unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    stream.send(b"hi").unwrap();
    stream.close().unwrap();

    let rx = stream.recv_stream().stats();
    assert_eq!(rx.frames_reordered, 1);
    assert_eq!(rx.bytes_read, 6);
    let tx = stream.send_stream().stats();
    assert_eq!((tx.frames_tx, tx.bytes_tx, tx.blocked), (2, 2, 0));
}
