//! Stack capture in the two regimes the reporter operates under.
//!
//! *Unwind mode* runs in a normal execution context (panic hook, simulated
//! signals) and may allocate and resolve symbol names. *Signal-safe mode*
//! runs inside a fault handler and only chases frames into a preallocated
//! fixed-size buffer; symbol resolution is deferred to whoever reads the
//! record later, or omitted.
//!
//! Both modes are capped at [`MAX_FRAMES`] so a corrupted stack cannot make
//! the walk run away.

use crash_record::Frame;
use std::{
    cell::UnsafeCell,
    mem, ptr,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst},
};

/// Maximum number of frames captured per backtrace.
pub const MAX_FRAMES: usize = 128;

/// A preallocated frame buffer that signal-safe capture writes raw
/// instruction pointers into.
pub(crate) struct FrameBuf {
    ips: [usize; MAX_FRAMES],
    len: usize,
}

impl FrameBuf {
    pub(crate) const fn new() -> Self {
        Self {
            ips: [0; MAX_FRAMES],
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    /// Appends a frame, returning false once the buffer is full.
    #[inline]
    pub(crate) fn push(&mut self, ip: usize) -> bool {
        if self.len == MAX_FRAMES {
            return false;
        }
        self.ips[self.len] = ip;
        self.len += 1;
        true
    }

    #[inline]
    pub(crate) fn ips(&self) -> &[usize] {
        &self.ips[..self.len]
    }

    pub(crate) fn frames(&self) -> Vec<Frame> {
        self.ips().iter().map(|&ip| Frame::raw(ip)).collect()
    }
}

/// Captures the current thread's backtrace in unwind mode, resolving symbol
/// names where the resolver can.
pub(crate) fn capture_unwind() -> Vec<Frame> {
    let mut frames = Vec::with_capacity(32);
    backtrace::trace(|frame| {
        let ip = frame.ip() as usize;
        let mut symbol = None;
        backtrace::resolve(frame.ip(), |sym| {
            if symbol.is_none() {
                symbol = sym.name().map(|name| name.to_string());
            }
        });
        frames.push(Frame { ip, symbol });
        frames.len() < MAX_FRAMES
    });
    frames
}

/// Captures the current thread's backtrace into a preallocated buffer.
///
/// # Safety
///
/// Performs no allocation and takes no locks, but bypasses the `backtrace`
/// crate's internal synchronization; the caller must guarantee no other
/// thread is unwinding concurrently. The signal handler guarantees this by
/// holding the shared scratch lock, and by the nature of the process dying.
pub(crate) unsafe fn capture_signal_safe(buf: &mut FrameBuf) {
    buf.clear();
    unsafe {
        backtrace::trace_unsynchronized(|frame| buf.push(frame.ip() as usize));
    }
}

// Remote capture of the main thread, used when a panic happens on some other
// thread. The requesting thread interrupts the main thread with a spare,
// otherwise-ignored signal; the handler runs *on* the main thread and walks
// its stack into a static buffer.

const REMOTE_SIGNAL: i32 = libc::SIGURG;

/// Spin iterations (100us apiece) before giving up on the main thread.
const REMOTE_WAIT_ITERS: u32 = 500;

static MAIN_THREAD: AtomicUsize = AtomicUsize::new(0);
static REMOTE_PENDING: AtomicBool = AtomicBool::new(false);
static REMOTE_DONE: AtomicBool = AtomicBool::new(false);

struct RemoteSlot(UnsafeCell<FrameBuf>);

// Access is serialized by the REMOTE_PENDING/REMOTE_DONE handshake.
unsafe impl Sync for RemoteSlot {}

static REMOTE_BUF: RemoteSlot = RemoteSlot(UnsafeCell::new(FrameBuf::new()));

/// Records the calling thread as the process main thread, first caller wins.
///
/// Invoked when the reporter is constructed, which is expected to happen on
/// the main thread; without it, off-main faults simply omit the main thread
/// backtrace.
pub(crate) fn note_main_thread() {
    let this = unsafe { libc::pthread_self() } as usize;
    let _ = MAIN_THREAD.compare_exchange(0, this, SeqCst, SeqCst);
}

pub(crate) fn is_main_thread() -> bool {
    let main = MAIN_THREAD.load(SeqCst);
    main != 0
        && unsafe { libc::pthread_equal(main as libc::pthread_t, libc::pthread_self()) } != 0
}

unsafe extern "C" fn remote_capture_handler(
    _sig: i32,
    _info: *mut libc::siginfo_t,
    _uc: *mut libc::c_void,
) {
    if REMOTE_PENDING.load(SeqCst) && !REMOTE_DONE.load(SeqCst) {
        unsafe {
            capture_signal_safe(&mut *REMOTE_BUF.0.get());
        }
        REMOTE_DONE.store(true, SeqCst);
    }
}

/// Best-effort capture of the main thread's backtrace from another thread.
///
/// Returns `None` when the main thread is unknown, when called *from* the
/// main thread, or when the main thread did not respond in time. Never
/// blocks for more than ~50ms.
pub(crate) fn capture_main_thread() -> Option<Vec<Frame>> {
    let main = MAIN_THREAD.load(SeqCst);
    if main == 0 || is_main_thread() {
        return None;
    }

    // One remote capture at a time; a concurrent requester just goes without.
    if REMOTE_PENDING
        .compare_exchange(false, true, SeqCst, SeqCst)
        .is_err()
    {
        return None;
    }
    REMOTE_DONE.store(false, SeqCst);

    let result = unsafe {
        let mut sa: libc::sigaction = mem::zeroed();
        libc::sigemptyset(&mut sa.sa_mask);
        sa.sa_sigaction = remote_capture_handler as usize;
        sa.sa_flags = libc::SA_SIGINFO;

        let mut old: libc::sigaction = mem::zeroed();
        if libc::sigaction(REMOTE_SIGNAL, &sa, &mut old) != 0 {
            REMOTE_PENDING.store(false, SeqCst);
            return None;
        }

        let captured = if libc::pthread_kill(main as libc::pthread_t, REMOTE_SIGNAL) == 0 {
            let nap = libc::timespec {
                tv_sec: 0,
                tv_nsec: 100_000,
            };
            let mut iters = 0;
            while !REMOTE_DONE.load(SeqCst) && iters < REMOTE_WAIT_ITERS {
                libc::nanosleep(&nap, ptr::null_mut());
                iters += 1;
            }
            REMOTE_DONE
                .load(SeqCst)
                .then(|| (*REMOTE_BUF.0.get()).frames())
        } else {
            None
        };

        libc::sigaction(REMOTE_SIGNAL, &old, ptr::null_mut());
        captured
    };

    REMOTE_PENDING.store(false, SeqCst);
    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unwind_capture_sees_this_function() {
        let frames = capture_unwind();
        assert!(!frames.is_empty());
        assert!(frames.len() <= MAX_FRAMES);
        // Test binaries are built with debug info, at least one frame should
        // have resolved.
        assert!(frames.iter().any(|f| f.symbol.is_some()));
    }

    #[test]
    fn frame_buf_caps_at_max() {
        let mut buf = FrameBuf::new();
        for ip in 0..MAX_FRAMES {
            assert!(buf.push(ip));
        }
        assert!(!buf.push(usize::MAX));
        assert_eq!(buf.ips().len(), MAX_FRAMES);

        buf.clear();
        assert!(buf.ips().is_empty());
    }

    #[test]
    fn remote_capture_walks_another_thread() {
        note_main_thread();
        assert!(is_main_thread());

        let frames = std::thread::spawn(capture_main_thread)
            .join()
            .unwrap()
            .expect("main thread should have been captured");
        assert!(!frames.is_empty());

        // From the recorded thread itself there is nothing remote to do.
        assert!(capture_main_thread().is_none());
    }
}
