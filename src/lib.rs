//! Jsh - Job Shell
//!
//! A small interactive shell: pipelines of external commands, background
//! jobs, and `fg`/`bg` job control driven by terminal signals.

#![warn(missing_debug_implementations, trivial_casts, unused_import_braces)]

#[macro_use]
extern crate log;

/// Logs the error of a non-critical `Result` and otherwise ignores it.
#[macro_export]
macro_rules! log_if_err {
    ($result:expr) => {
        if let Err(ref e) = $result {
            error!("{}", e);
        }
    };
    ($result:expr, $fmt:expr) => {
        if let Err(ref e) = $result {
            error!(concat!($fmt, ": {}"), e);
        }
    };
    ($result:expr, $fmt:expr, $($arg:tt)*) => {
        if let Err(ref e) = $result {
            error!(concat!($fmt, ": {}"), $($arg)*, e);
        }
    };
}

pub mod core;
pub mod errors;
pub mod shell;
mod util;

pub use crate::shell::{Shell, ShellConfig};
pub use crate::util::JshExitStatusExt;
