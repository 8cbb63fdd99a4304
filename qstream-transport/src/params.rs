// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::time::Duration;

use qstream_common::Role;
use static_assertions::const_assert;

/// Frames the session may queue for a stream before `deliver` blocks.
pub const DEFAULT_INBOUND_QUEUE_CAPACITY: usize = 8;
const_assert!(DEFAULT_INBOUND_QUEUE_CAPACITY > 0);

/// Local configuration for a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParameters {
    role: Role,
    inbound_queue_capacity: usize,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl Default for StreamParameters {
    fn default() -> Self {
        Self {
            role: Role::Client,
            inbound_queue_capacity: DEFAULT_INBOUND_QUEUE_CAPACITY,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl StreamParameters {
    #[must_use]
    pub const fn get_role(&self) -> Role {
        self.role
    }

    /// The role we play on the connection. This picks which of the peer's
    /// transport parameters sets the initial send window.
    #[must_use]
    pub const fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub const fn get_inbound_queue_capacity(&self) -> usize {
        self.inbound_queue_capacity
    }

    /// # Panics
    /// If `capacity` is zero.
    #[must_use]
    pub fn inbound_queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "the inbound queue needs room for a frame");
        self.inbound_queue_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn get_read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Bound how long a read waits for the first byte. `None` waits forever.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn get_write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    /// Bound how long a write waits for flow control credit. `None` waits
    /// forever.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }
}
