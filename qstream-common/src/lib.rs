// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

pub mod log;

/// Which end of the connection we are.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash, strum::Display)]
pub enum Role {
    Client,
    Server,
}
