// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

// Stream ID handling.

use qstream_common::Role;

/// A stream identifier. The low bit says who opened the stream, the next one
/// whether it is unidirectional. Which of the peer's window parameters
/// applies depends on both.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Ord, PartialOrd, Hash)]
pub struct StreamId(u64);

impl StreamId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_uni(self) -> bool {
        self.0 & 0x02 != 0
    }

    /// The role of the endpoint that opened the stream.
    #[must_use]
    pub const fn initiator(self) -> Role {
        if self.0 & 0x01 == 0 {
            Role::Client
        } else {
            Role::Server
        }
    }

    #[must_use]
    pub fn is_self_initiated(self, my_role: Role) -> bool {
        self.initiator() == my_role
    }
}

impl ::std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        write!(f, "{}", self.as_u64())
    }
}

#[cfg(test)]
mod test {
    use qstream_common::Role;

    use super::StreamId;

    #[test]
    fn bit_values() {
        let id = StreamId::new(16);
        assert!(!id.is_uni());
        assert_eq!(id.initiator(), Role::Client);
        assert!(id.is_self_initiated(Role::Client));
        assert!(!id.is_self_initiated(Role::Server));

        let id = StreamId::new(7);
        assert!(id.is_uni());
        assert_eq!(id.initiator(), Role::Server);
        assert!(id.is_self_initiated(Role::Server));
        assert_eq!(id.to_string(), "7");
    }
}
