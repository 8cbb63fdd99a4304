// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::{io::Write as _, sync::OnceLock, time::Instant};

use env_logger::Builder;

fn since_start() -> std::time::Duration {
    static START_TIME: OnceLock<Instant> = OnceLock::new();
    START_TIME.get_or_init(Instant::now).elapsed()
}

/// Install the `env_logger` backend. Only the first call has any effect.
///
/// The filter comes from `RUST_LOG`; `level_filter` overrides it when set.
pub fn init(level_filter: Option<::log::LevelFilter>) {
    static INIT_ONCE: OnceLock<()> = OnceLock::new();
    INIT_ONCE.get_or_init(|| {
        let mut builder = Builder::from_default_env();
        if let Some(filter) = level_filter {
            builder.filter_level(filter);
        }
        builder.format(|buf, record| {
            let elapsed = since_start();
            writeln!(
                buf,
                "{}.{:03} {} {}",
                elapsed.as_secs(),
                elapsed.as_millis() % 1000,
                record.level(),
                record.args()
            )
        });
        if builder.try_init().is_ok() {
            ::log::debug!("Logging initialized");
        }
    });
}

#[macro_export]
macro_rules! qlog {
    ($lvl:expr, [$ctx:expr], $($arg:tt)*) => ( {
        ::log::log!($lvl, "[{}] {}", $ctx, format!($($arg)*));
    } );
    ($lvl:expr, $($arg:tt)*) => ( ::log::log!($lvl, $($arg)*) );
}
#[macro_export]
macro_rules! qerror {
    ([$ctx:expr], $($arg:tt)*) => ( $crate::qlog!(::log::Level::Error, [$ctx], $($arg)*) );
    ($($arg:tt)*) => ( $crate::qlog!(::log::Level::Error, $($arg)*) );
}
#[macro_export]
macro_rules! qwarn {
    ([$ctx:expr], $($arg:tt)*) => ( $crate::qlog!(::log::Level::Warn, [$ctx], $($arg)*) );
    ($($arg:tt)*) => ( $crate::qlog!(::log::Level::Warn, $($arg)*) );
}
#[macro_export]
macro_rules! qinfo {
    ([$ctx:expr], $($arg:tt)*) => ( $crate::qlog!(::log::Level::Info, [$ctx], $($arg)*) );
    ($($arg:tt)*) => ( $crate::qlog!(::log::Level::Info, $($arg)*) );
}
#[macro_export]
macro_rules! qdebug {
    ([$ctx:expr], $($arg:tt)*) => ( $crate::qlog!(::log::Level::Debug, [$ctx], $($arg)*) );
    ($($arg:tt)*) => ( $crate::qlog!(::log::Level::Debug, $($arg)*) );
}
#[macro_export]
macro_rules! qtrace {
    ([$ctx:expr], $($arg:tt)*) => ( $crate::qlog!(::log::Level::Trace, [$ctx], $($arg)*) );
    ($($arg:tt)*) => ( $crate::qlog!(::log::Level::Trace, $($arg)*) );
}
