//! Logging for the synchronization layer.
//!
//! Messages go to a sink registered with [`set_log_fn`]; until the kernel
//! registers one they are discarded. Levels above
//! [`MAX_LOG_LEVEL`](crate::config::MAX_LOG_LEVEL) are dropped before the
//! sink is consulted.
//!
//! Trace output is split by subsystem. [`ktrace!`] takes a [`Trace`]
//! category and only reaches the sink when that category is switched on
//! with [`set_trace_mask`], so semaphore traffic can be watched without
//! every lock handoff in the log.

use core::fmt;
use core::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use bitflags::bitflags;

use crate::config::MAX_LOG_LEVEL;

/// Log severity, lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// The system cannot continue and is about to halt.
    Fatal = 0,
    /// An operation failed.
    Error = 1,
    /// Unexpected but recoverable.
    Warn = 2,
    /// High-level progress.
    Info = 3,
    /// Diagnostic detail.
    Debug = 4,
    /// Per-operation tracing, filtered by [`Trace`] category.
    Trace = 5,
}

impl LogLevel {
    /// Fixed-width name for aligned output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }
}

bitflags! {
    /// Trace categories.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Trace: u32 {
        /// Slot allocation and handle validation.
        const POOL = 1 << 0;
        /// Semaphore wait/signal.
        const SEM = 1 << 1;
        /// Lock acquire/release and handoff.
        const LOCK = 1 << 2;
        /// Condition wait/signal.
        const COND = 1 << 3;
        /// Interrupt masking.
        const IRQ = 1 << 4;
    }
}

/// Signature of the log sink.
pub type LogFn = fn(LogLevel, Trace, fmt::Arguments<'_>);

fn null_log(_level: LogLevel, _category: Trace, _args: fmt::Arguments<'_>) {}

static LOG_FN: AtomicPtr<()> = AtomicPtr::new(null_log as *mut ());

static TRACE_MASK: AtomicU32 = AtomicU32::new(0);

/// Registers the log sink. May be called again to replace it.
///
/// The sink runs with interrupts masked and must not call back into the
/// synchronization layer.
pub fn set_log_fn(f: LogFn) {
    LOG_FN.store(f as *mut (), Ordering::Release);
}

/// Selects which [`Trace`] categories reach the sink.
pub fn set_trace_mask(mask: Trace) {
    TRACE_MASK.store(mask.bits(), Ordering::Relaxed);
}

/// Returns the categories currently traced.
pub fn trace_mask() -> Trace {
    Trace::from_bits_truncate(TRACE_MASK.load(Ordering::Relaxed))
}

#[inline]
fn load_log_fn() -> LogFn {
    let ptr = LOG_FN.load(Ordering::Acquire);
    // SAFETY: only `LogFn` pointers (or the initial `null_log`) are stored.
    unsafe { core::mem::transmute::<*mut (), LogFn>(ptr) }
}

/// Implementation detail of [`klog!`]. Not public API.
#[doc(hidden)]
pub fn _log(level: LogLevel, category: Trace, args: fmt::Arguments<'_>) {
    if level > MAX_LOG_LEVEL {
        return;
    }
    if level == LogLevel::Trace && !trace_mask().intersects(category) {
        return;
    }
    load_log_fn()(level, category, args);
}

/// Logs a message at the given level and category.
#[macro_export]
macro_rules! klog {
    ($level:expr, $category:expr, $($arg:tt)*) => {
        $crate::log::_log($level, $category, format_args!($($arg)*))
    };
}

/// Logs a fatal-level message.
#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => {
        $crate::klog!($crate::log::LogLevel::Fatal, $crate::log::Trace::empty(), $($arg)*)
    };
}

/// Logs an error-level message.
#[macro_export]
macro_rules! kerr {
    ($($arg:tt)*) => {
        $crate::klog!($crate::log::LogLevel::Error, $crate::log::Trace::empty(), $($arg)*)
    };
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {
        $crate::klog!($crate::log::LogLevel::Warn, $crate::log::Trace::empty(), $($arg)*)
    };
}

/// Logs an info-level message.
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {
        $crate::klog!($crate::log::LogLevel::Info, $crate::log::Trace::empty(), $($arg)*)
    };
}

/// Logs a debug-level message.
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {
        $crate::klog!($crate::log::LogLevel::Debug, $crate::log::Trace::empty(), $($arg)*)
    };
}

/// Logs a trace-level message in one [`Trace`] category.
#[macro_export]
macro_rules! ktrace {
    ($category:expr, $($arg:tt)*) => {
        $crate::klog!($crate::log::LogLevel::Trace, $category, $($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static CAPTURED: Mutex<Vec<(LogLevel, String)>> = Mutex::new(Vec::new());

    fn capture(level: LogLevel, _category: Trace, args: fmt::Arguments<'_>) {
        CAPTURED.lock().unwrap().push((level, args.to_string()));
    }

    fn captured(text: &str) -> bool {
        CAPTURED.lock().unwrap().iter().any(|(_, msg)| msg == text)
    }

    #[test]
    fn level_names_are_fixed_width() {
        for level in [
            LogLevel::Fatal,
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert_eq!(level.name().len(), 5);
        }
    }

    #[test]
    fn severity_ordering() {
        assert!(LogLevel::Fatal < LogLevel::Warn);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    // Sink and mask are global, so one test owns them.
    #[test]
    fn sink_and_trace_filtering() {
        set_log_fn(capture);

        kfatal!("queue {} corrupt", 3);
        assert!(captured("queue 3 corrupt"));

        set_trace_mask(Trace::SEM);
        ktrace!(Trace::SEM, "sem traced");
        ktrace!(Trace::LOCK, "lock filtered");
        assert!(captured("sem traced"));
        assert!(!captured("lock filtered"));

        set_trace_mask(Trace::SEM | Trace::LOCK);
        assert_eq!(trace_mask(), Trace::SEM | Trace::LOCK);
        ktrace!(Trace::LOCK, "lock traced");
        assert!(captured("lock traced"));

        set_trace_mask(Trace::empty());
    }
}
