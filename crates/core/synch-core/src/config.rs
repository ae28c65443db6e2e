//! Compile-time configuration.
//!
//! Pool sizes and the log ceiling come from the build environment, so a
//! kernel image can be sized without editing source:
//!
//! | Variable             | Default | Meaning                               |
//! |----------------------|---------|---------------------------------------|
//! | `SYNCH_MAX_SEMS`     | 32      | semaphore slots                       |
//! | `SYNCH_MAX_LOCKS`    | 64      | lock slots                            |
//! | `SYNCH_MAX_CONDS`    | 32      | condition variable slots              |
//! | `SYNCH_MAX_WAITERS`  | 32      | blocked processes per primitive       |
//! | `SYNCH_LOG_LEVEL`    | `trace` | most verbose level that is compiled in|
//!
//! Unset, empty, zero or non-numeric values fall back to the default.

use crate::log::LogLevel;

/// Number of semaphore slots.
pub const MAX_SEMS: usize = parse_usize(option_env!("SYNCH_MAX_SEMS"), 32);

/// Number of lock slots.
pub const MAX_LOCKS: usize = parse_usize(option_env!("SYNCH_MAX_LOCKS"), 64);

/// Number of condition variable slots.
pub const MAX_CONDS: usize = parse_usize(option_env!("SYNCH_MAX_CONDS"), 32);

/// Capacity of each wait queue. Matches the size of the process table, so
/// an overflow means the queue bookkeeping is corrupt.
pub const MAX_WAITERS: usize = parse_usize(option_env!("SYNCH_MAX_WAITERS"), 32);

/// Most verbose log level compiled into the crate.
pub const MAX_LOG_LEVEL: LogLevel = match option_env!("SYNCH_LOG_LEVEL") {
    Some(level) => match level.as_bytes() {
        b"fatal" => LogLevel::Fatal,
        b"error" => LogLevel::Error,
        b"warn" => LogLevel::Warn,
        b"info" => LogLevel::Info,
        b"debug" => LogLevel::Debug,
        _ => LogLevel::Trace,
    },
    None => LogLevel::Trace,
};

// Handles travel as `i32` through the syscall surface.
const _: () = assert!(MAX_SEMS <= i32::MAX as usize);
const _: () = assert!(MAX_LOCKS <= i32::MAX as usize);
const _: () = assert!(MAX_CONDS <= i32::MAX as usize);

const fn parse_usize(raw: Option<&str>, default: usize) -> usize {
    let Some(raw) = raw else {
        return default;
    };
    let bytes = raw.as_bytes();
    let mut value: usize = 0;
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i];
        if !byte.is_ascii_digit() {
            return default;
        }
        value = match value.checked_mul(10) {
            Some(v) => v,
            None => return default,
        };
        value = match value.checked_add((byte - b'0') as usize) {
            Some(v) => v,
            None => return default,
        };
        i += 1;
    }
    if value == 0 { default } else { value }
}
