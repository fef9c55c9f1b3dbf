//! Per-module switchable logging for code that runs on every tick.
//!
//! A module opts in by defining `const ENABLE_LOGS: bool` and importing the
//! macros from the crate root:
//!
//! ```ignore
//! const ENABLE_LOGS: bool = false;
//! use crate::{log_info, log_warn};
//!
//! log_warn!("tick took {}ms", elapsed);
//! ```
//!
//! With the flag off the arguments are never formatted, so a 30 Hz loop can
//! keep its diagnostics in place at no cost.

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
