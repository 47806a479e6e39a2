#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod align;

pub use align::*;

#[doc(hidden)]
pub use ::log as __log;

/// Panics in debug builds, logs an error in release builds.
///
/// Used for invariant violations that should never happen but aren't worth a
/// runtime failure on the hot path of a release build.
#[macro_export]
macro_rules! debug_panic {
    ($($arg:tt)+) => {{
        if cfg!(debug_assertions) {
            panic!($($arg)+);
        } else {
            $crate::__log::error!($($arg)+);
        }
    }};
}
