use super::emit::{self, SigBuf};
use crate::{
    Error, Signal,
    config::SignalSet,
    stack::{self, FrameBuf},
    store::{self, RawSlot},
};
use std::{mem, ptr};

// std::cmp::max is not const :(
const fn get_stack_size() -> usize {
    if libc::SIGSTKSZ > 16 * 1024 {
        libc::SIGSTKSZ
    } else {
        16 * 1024
    }
}

/// The size of the alternate stack the handler runs on.
///
/// This has a minimum size of 16k; the memory is only ever committed if a
/// signal is actually delivered, and an alternate stack is the only way to
/// survive a stack-overflow `SIGSEGV` long enough to record it.
const SIG_STACK_SIZE: usize = get_stack_size();

struct StackSave {
    old: Option<libc::stack_t>,
    new: libc::stack_t,
}

unsafe impl Send for StackSave {}

static STACK_SAVE: parking_lot::Mutex<Option<StackSave>> = parking_lot::const_mutex(None);

/// Creates an alternate stack to run the signal handler on, keeping any
/// pre-existing one if it is already big enough.
unsafe fn install_sigaltstack() -> Result<(), Error> {
    unsafe {
        let mut old_stack = mem::zeroed();
        if libc::sigaltstack(ptr::null(), &mut old_stack) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        if old_stack.ss_flags & libc::SS_DISABLE == 0 && old_stack.ss_size >= SIG_STACK_SIZE {
            return Ok(());
        }

        // Map our own, with a guard page below it so that overflowing the
        // handler stack faults cleanly instead of corrupting memory.
        let guard_size = libc::sysconf(libc::_SC_PAGESIZE) as usize;
        let alloc_size = guard_size + SIG_STACK_SIZE;

        let map = libc::mmap(
            ptr::null_mut(),
            alloc_size,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        );
        if map == libc::MAP_FAILED {
            return Err(Error::OutOfMemory);
        }

        let stack_ptr = (map as usize + guard_size) as *mut libc::c_void;
        if libc::mprotect(
            stack_ptr,
            SIG_STACK_SIZE,
            libc::PROT_READ | libc::PROT_WRITE,
        ) != 0
        {
            let err = std::io::Error::last_os_error();
            libc::munmap(map, alloc_size);
            return Err(err.into());
        }

        let new_stack = libc::stack_t {
            ss_sp: stack_ptr,
            ss_flags: 0,
            ss_size: SIG_STACK_SIZE,
        };
        if libc::sigaltstack(&new_stack, ptr::null_mut()) != 0 {
            let err = std::io::Error::last_os_error();
            libc::munmap(map, alloc_size);
            return Err(err.into());
        }

        *STACK_SAVE.lock() = Some(StackSave {
            old: (old_stack.ss_flags & libc::SS_DISABLE == 0).then_some(old_stack),
            new: new_stack,
        });

        Ok(())
    }
}

unsafe fn restore_sigaltstack() {
    let mut ssl = STACK_SAVE.lock();

    // Only unwind our own installation; if someone else swapped the stack
    // since, leave theirs alone.
    if let Some(ss) = &mut *ssl {
        unsafe {
            let mut current_stack = mem::zeroed();
            if libc::sigaltstack(ptr::null(), &mut current_stack) == -1 {
                return;
            }

            if current_stack.ss_sp == ss.new.ss_sp {
                if let Some(old) = ss.old {
                    if libc::sigaltstack(&old, ptr::null_mut()) == -1 {
                        return;
                    }
                } else {
                    let mut disable: libc::stack_t = mem::zeroed();
                    disable.ss_flags = libc::SS_DISABLE;
                    if libc::sigaltstack(&disable, ptr::null_mut()) == -1 {
                        return;
                    }
                }
            }

            let guard_size = libc::sysconf(libc::_SC_PAGESIZE) as usize;
            libc::munmap(
                (ss.new.ss_sp as usize - guard_size) as *mut libc::c_void,
                guard_size + ss.new.ss_size,
            );
            *ssl = None;
        }
    }
}

struct InstalledSet {
    mask: SignalSet,
    /// Previously installed actions, indexed by [`Signal::index`].
    saved: [Option<libc::sigaction>; 6],
}

static OLD_HANDLERS: parking_lot::Mutex<Option<InstalledSet>> = parking_lot::const_mutex(None);

/// The prepared temp/destination paths the handler persists through.
static SLOT: parking_lot::Mutex<Option<RawSlot>> = parking_lot::const_mutex(None);

/// Capture scratch space. The alternate stack is only 16k, so neither the
/// frame buffer nor the formatting buffer can live on it; keep them in .bss.
struct Scratch {
    frames: FrameBuf,
    json: SigBuf,
}

static SCRATCH: parking_lot::Mutex<Scratch> = parking_lot::const_mutex(Scratch {
    frames: FrameBuf::new(),
    json: SigBuf::new(),
});

/// Hooks every signal in `mask`, saving the previously installed actions for
/// chaining and restoration.
pub(crate) fn install(mask: SignalSet, slot: RawSlot) -> Result<(), Error> {
    let mut ohl = OLD_HANDLERS.lock();

    if ohl.is_some() {
        return Err(Error::HandlerAlreadyInstalled);
    }

    // SAFETY: syscalls
    unsafe {
        install_sigaltstack()?;

        *SLOT.lock() = Some(slot);

        let mut sa: libc::sigaction = mem::zeroed();
        libc::sigemptyset(&mut sa.sa_mask);

        // Mask every intercepted signal while we're handling one of them.
        for sig in mask.iter() {
            libc::sigaddset(&mut sa.sa_mask, sig as i32);
        }

        sa.sa_sigaction = signal_handler as usize;
        sa.sa_flags = libc::SA_ONSTACK | libc::SA_SIGINFO;

        let mut saved = [None; 6];
        for sig in mask.iter() {
            let mut old = mem::zeroed();
            // Failure to hook an individual signal is intentionally ignored,
            // the rest of the mask still gets coverage.
            if libc::sigaction(sig as i32, &sa, &mut old) == 0 {
                saved[sig.index()] = Some(old);
            }
        }

        *ohl = Some(InstalledSet { mask, saved });
    }

    Ok(())
}

/// Restores every saved handler and the previous alternate stack. Idempotent.
pub(crate) fn uninstall() {
    let mut ohl = OLD_HANDLERS.lock();

    if let Some(set) = ohl.take() {
        // SAFETY: syscalls
        unsafe {
            for sig in set.mask.iter() {
                restore_action(sig, set.saved[sig.index()].as_ref());
            }
            restore_sigaltstack();
        }
    }

    *SLOT.lock() = None;
}

/// Puts back the saved action for one signal, falling back to the default
/// disposition if there was none or it cannot be restored.
unsafe fn restore_action(sig: Signal, saved: Option<&libc::sigaction>) {
    unsafe {
        match saved {
            Some(action) => {
                if libc::sigaction(sig as i32, action, ptr::null_mut()) == -1 {
                    libc::signal(sig as i32, libc::SIG_DFL);
                }
            }
            None => {
                libc::signal(sig as i32, libc::SIG_DFL);
            }
        }
    }
}

/// Runs the capture-and-persist sequence for a signal: walk the stack into
/// the static frame buffer, format the record into the static byte buffer,
/// and write it through the raw slot. Everything here is allocation-free.
///
/// Returns true if a record reached the store. Failures are absorbed, there
/// is no second chance mid-crash.
fn capture_and_persist(signal: Signal) -> bool {
    let slot = SLOT.lock();
    let Some(slot) = &*slot else {
        return false;
    };

    let mut scratch = SCRATCH.lock();
    let Scratch { frames, json } = &mut *scratch;

    // SAFETY: nothing else unwinds while the process is dying and we hold
    // the scratch lock.
    unsafe {
        stack::capture_signal_safe(frames);
    }

    emit::emit_record(json, signal.name(), frames) && store::raw_write(slot, json.as_slice())
}

/// Drives the signal path from a normal execution context, without a signal
/// ever being raised: same capture, same formatting, same raw write, but no
/// handler restoration and no re-raise.
///
/// Returns false when the signal is not currently intercepted, mirroring
/// what real delivery would do.
pub(crate) fn simulate(signal: Signal) -> bool {
    {
        let installed = OLD_HANDLERS.lock();
        match &*installed {
            Some(set) if set.mask.contains(signal) => {}
            _ => return false,
        }
    }

    capture_and_persist(signal)
}

/// This is the actual function installed for each hooked signal, invoked by
/// the kernel.
unsafe extern "C" fn signal_handler(sig: i32, info: *mut libc::siginfo_t, _uc: *mut libc::c_void) {
    unsafe {
        let Some(signal) = Signal::from_raw(sig) else {
            return;
        };

        debug_print!("entered signal handler");

        capture_and_persist(signal);

        debug_print!("record persisted, handing the signal back");

        // We only observe the crash. Put the previously installed action
        // back so the default (or someone else's) crash behavior still runs.
        {
            let ohl = OLD_HANDLERS.lock();
            if let Some(set) = &*ohl {
                restore_action(signal, set.saved[signal.index()].as_ref());
            } else {
                restore_action(signal, None);
            }
        }

        let info = &*info;

        if info.si_code <= 0 || signal == Signal::Abort || signal == Signal::Pipe {
            // Delivered via kill/raise, or a signal that will not re-trigger
            // by itself once the handler returns; queue it again so the
            // restored handler receives it.
            cfg_if::cfg_if! {
                if #[cfg(any(target_os = "linux", target_os = "android"))] {
                    let tid = libc::syscall(libc::SYS_gettid) as i32;
                    if libc::syscall(libc::SYS_tgkill, std::process::id(), tid, sig) < 0 {
                        // A sandbox may forbid tgkill; terminating directly
                        // at least ends the process, if with the wrong code.
                        libc::_exit(1);
                    }
                } else {
                    if libc::raise(sig) != 0 {
                        libc::_exit(1);
                    }
                }
            }
        } else {
            // A synchronous hard fault (e.g. SIGSEGV). Returning re-executes
            // the faulting instruction and the kernel re-delivers straight
            // to the restored handler.
        }
    }
}
