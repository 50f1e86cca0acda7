//! [`CrashReporter`] detects abnormal process termination, captures a
//! [`CrashRecord`] describing the failure, and persists it so the *next*
//! launch of the program can retrieve and report it.
//!
//! Three kinds of failure are intercepted, each independently togglable via
//! [`CatchOptions`]:
//!
//! # Fatal signals
//!
//! A configurable subset of the POSIX fault signals is hooked with
//! `sigaction`:
//!
//! ## `SIGSEGV`
//!
//! Sent to a process when it makes an invalid virtual memory reference, a
//! [segmentation fault](https://en.wikipedia.org/wiki/Segmentation_fault).
//! This covers infamous `null` pointer access, out of bounds access, use
//! after free, stack overflows, etc.
//!
//! ## `SIGFPE`
//!
//! Sent to a process when it executes an erroneous arithmetic operation.
//! Though it stands for **f**loating **p**oint **e**xception this signal
//! covers integer operations as well.
//!
//! ## `SIGABRT`
//!
//! Sent to a process to tell it to abort, usually initiated by the process
//! itself when it calls `std::process::abort` or `libc::abort`.
//!
//! ## `SIGILL`
//!
//! Sent to a process when it attempts to execute an **illegal**, malformed,
//! unknown, or privileged, instruction.
//!
//! ## `SIGBUS`
//!
//! Sent to a process when it causes a [bus error](https://en.wikipedia.org/wiki/Bus_error).
//!
//! ## `SIGPIPE`
//!
//! Sent to a process when it writes to a pipe or socket whose reading end
//! has been closed.
//!
//! The signal handler runs in a compromised context: it walks the stack into
//! a preallocated buffer, formats the record into a preallocated buffer, and
//! persists it with raw `open`/`write`/`fsync`/`rename` syscalls on paths
//! prepared ahead of time. It then restores the previously installed handler
//! for the signal and lets the fault take its normal course; interception
//! observes the crash, it does not prevent it. An alternate signal stack is
//! installed so that stack-overflow `SIGSEGV` can still be handled.
//!
//! # Panics
//!
//! The process-wide [panic hook](std::panic::set_hook) is replaced, chaining
//! to whichever hook was installed before. This path runs in a normal
//! execution context and captures a richer record: panic message, source
//! location, a symbolized backtrace, and, when the panic happened off the
//! main thread, a best-effort backtrace of the main thread as well.
//!
//! # Memory pressure
//!
//! An OS-initiated kill under memory pressure gives the process no chance to
//! run a handler, so a warning record is persisted *ahead* of the kill, when
//! pressure is first observed. On Linux this watches the
//! [PSI](https://docs.kernel.org/accounting/psi.html) memory file; on every
//! platform [`CrashReporter::notify_memory_pressure`] lets an external
//! monitor drive the same path.
//!
//! On the next launch, [`CrashReporter::latest_crash`] returns whatever the
//! previous process managed to persist, and
//! [`CrashReporter::remove_latest_crash`] consumes it. At most one record is
//! retained; a new crash overwrites an unconsumed older one.

#![allow(unsafe_code)]

#[cfg(feature = "debug-print")]
#[macro_export]
macro_rules! debug_print {
    ($s:literal) => {
        let cstr = concat!($s, "\n");
        $crate::write_stderr(cstr);
    };
}

#[cfg(not(feature = "debug-print"))]
#[macro_export]
macro_rules! debug_print {
    ($s:literal) => {};
}

mod attachment;
mod config;
mod error;
mod panic_hook;
mod reporter;
mod stack;
mod store;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod signal;

        pub use signal::Signal;
    } else {
        compile_error!("crash-catcher hooks POSIX signal delivery and only supports unix targets");
    }
}

mod memory;

pub use attachment::{Attachment, AttachmentError, build_attachment};
pub use config::{CatchConfiguration, CatchOption, CatchOptions, SignalSet};
pub use crash_record::{CrashRecord, Frame};
pub use error::Error;
pub use reporter::{CrashReporter, OnSaveCrash};
pub use stack::MAX_FRAMES;
pub use store::{CrashStore, FileStore};

/// Writes the specified string directly to stderr.
///
/// This is safe to be called from within a compromised context.
#[inline]
pub fn write_stderr(s: &'static str) {
    unsafe {
        libc::write(2, s.as_ptr().cast(), s.len());
    }
}
