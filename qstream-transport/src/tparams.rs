// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// Negotiated transport parameters, as far as a stream cares about them.
// Encoding and the handshake that produces them live elsewhere.

use std::collections::HashMap;

use qstream_common::Role;

use crate::{stream_id::StreamId, Error, Res};

/// The parameters that set a stream's initial send window, with their wire
/// identifiers.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[repr(u64)]
pub enum TransportParameterId {
    InitialMaxStreamDataBidiLocal = 0x05,
    InitialMaxStreamDataBidiRemote = 0x06,
    InitialMaxStreamDataUni = 0x07,
}

/// Integer transport parameters received from the peer.
#[derive(Default, PartialEq, Eq, Debug, Clone)]
pub struct TransportParameters {
    params: HashMap<TransportParameterId, u64>,
}

impl TransportParameters {
    pub fn set_integer(&mut self, id: TransportParameterId, value: u64) {
        self.params.insert(id, value);
    }

    #[must_use]
    pub fn get_integer(&self, id: TransportParameterId) -> Option<u64> {
        self.params.get(&id).copied()
    }
}

/// Supplies the flow-control window a new stream starts with.
pub trait WindowParameters {
    /// The initial limit on how much we may send on `stream_id`, given that we
    /// play `role` on the connection.
    ///
    /// # Errors
    /// When the limit is not known yet.
    fn initial_send_window(&self, stream_id: StreamId, role: Role) -> Res<u64>;
}

impl WindowParameters for TransportParameters {
    fn initial_send_window(&self, stream_id: StreamId, role: Role) -> Res<u64> {
        // These are the peer's parameters, so "local" and "remote" are from
        // the peer's point of view.
        let id = if stream_id.is_uni() {
            TransportParameterId::InitialMaxStreamDataUni
        } else if stream_id.is_self_initiated(role) {
            TransportParameterId::InitialMaxStreamDataBidiRemote
        } else {
            TransportParameterId::InitialMaxStreamDataBidiLocal
        };
        self.get_integer(id).ok_or(Error::TransportParameterError)
    }
}
