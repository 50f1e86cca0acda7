//! Interception of unwinding panics via the process-wide panic hook.
//!
//! Unlike the signal path this runs in a normal execution context, so the
//! record is richer: panic message, source location, a symbolized backtrace
//! of the panicking thread and, when the panic happened off the main thread,
//! a best-effort backtrace of the main thread too.
//!
//! Whatever hook was installed before us is always chained to after
//! persistence; replacing the hook must not swallow handlers installed by
//! unrelated code.

use crate::{reporter::Inner, stack};
use crash_record::CrashRecord;
use std::{
    panic::{self, PanicHookInfo},
    sync::Arc,
};

type PrevHook = Arc<dyn Fn(&PanicHookInfo<'_>) + Send + Sync>;

/// The hook that was installed before ours, kept for chaining and for
/// restoration on uninstall.
static PREV_HOOK: parking_lot::Mutex<Option<PrevHook>> = parking_lot::const_mutex(None);

pub(crate) fn install(inner: Arc<Inner>) {
    let mut prev_guard = PREV_HOOK.lock();
    if prev_guard.is_some() {
        return;
    }

    let prev: PrevHook = Arc::from(panic::take_hook());
    let chained = prev.clone();
    panic::set_hook(Box::new(move |info| {
        record_panic(&inner, info);
        (*chained)(info);
    }));
    *prev_guard = Some(prev);
}

pub(crate) fn uninstall() {
    let mut prev_guard = PREV_HOOK.lock();
    if let Some(prev) = prev_guard.take() {
        drop(panic::take_hook());
        panic::set_hook(Box::new(move |info| (*prev)(info)));
    }
}

fn record_panic(inner: &Inner, info: &PanicHookInfo<'_>) {
    let reason = if let Some(s) = info.payload().downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "<unknown panic payload>".to_owned()
    };

    let mut record = CrashRecord::new("RustPanic", reason, stack::capture_unwind());

    if let Some(location) = info.location() {
        record
            .extra
            .insert("location".to_owned(), location.to_string());
    }

    if !stack::is_main_thread() {
        record.main_thread_backtrace = stack::capture_main_thread();
    }

    inner.save(record);
}
