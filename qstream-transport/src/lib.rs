// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-stream reassembly and flow control.
//!
//! A [`Stream`] turns an unordered feed of [`StreamFrame`]s into an ordered
//! byte stream and throttles writes to the peer's flow-control window. The
//! session that owns the connection drives the stream through a
//! [`StreamHandle`].

use std::io;

pub mod fc;
pub mod frame;
pub mod inbound;
pub mod params;
pub mod recv_stream;
pub mod send_stream;
pub mod stats;
pub mod stream;
pub mod stream_id;
pub mod tparams;

pub use self::{
    fc::WindowGate,
    frame::StreamFrame,
    inbound::{DeliverError, FrameQueue, FrameSource, Wait},
    params::StreamParameters,
    recv_stream::{RecvStream, RxStreamOrderer},
    send_stream::{FrameSink, SendStream},
    stats::{RecvStreamStats, SendStreamStats},
    stream::{Stream, StreamHandle},
    stream_id::StreamId,
    tparams::{TransportParameterId, TransportParameters, WindowParameters},
};

/// The application error code carried by a stream reset.
pub type AppError = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The connection carrying the stream is gone.
    ConnectionClosed,
    /// The connection failed with the given transport error code.
    ConnectionError(u64),
    /// The peer reset the stream.
    StreamReset(AppError),
    /// Data beyond the final size of a stream, or a conflicting final size.
    FinalSizeError,
    /// Read past the end of the stream.
    NoMoreData,
    /// A required transport parameter has not been negotiated.
    TransportParameterError,
    /// A blocking call reached its deadline. Never terminal.
    Timeout,
}

impl Error {
    /// Whether this error ends the stream for good.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Timeout)
    }
}

impl ::std::error::Error for Error {}

impl ::std::fmt::Display for Error {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        write!(f, "Stream error: {self:?}")
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::ConnectionClosed | Error::ConnectionError(_) => io::ErrorKind::ConnectionAborted,
            Error::StreamReset(_) => io::ErrorKind::ConnectionReset,
            Error::NoMoreData => io::ErrorKind::UnexpectedEof,
            Error::Timeout => io::ErrorKind::TimedOut,
            Error::FinalSizeError | Error::TransportParameterError => io::ErrorKind::InvalidData,
        };
        Self::new(kind, err)
    }
}

pub type Res<T> = Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::io;

    use super::Error;

    #[test]
    fn io_error_kinds() {
        let e = io::Error::from(Error::Timeout);
        assert_eq!(e.kind(), io::ErrorKind::TimedOut);
        let e = io::Error::from(Error::StreamReset(7));
        assert_eq!(e.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(
            e.into_inner().unwrap().downcast::<Error>().unwrap().as_ref(),
            &Error::StreamReset(7)
        );
    }

    #[test]
    fn only_timeouts_are_transient() {
        assert!(!Error::Timeout.is_terminal());
        assert!(Error::ConnectionClosed.is_terminal());
        assert!(Error::FinalSizeError.is_terminal());
    }

    #[test]
    fn display() {
        assert_eq!(Error::NoMoreData.to_string(), "Stream error: NoMoreData");
    }
}
