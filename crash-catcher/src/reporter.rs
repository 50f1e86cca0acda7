use crate::{
    Error, Signal,
    config::{CatchConfiguration, CatchOption, CatchOptions, SignalSet},
    memory, panic_hook, signal, stack,
    store::{CrashStore, FileStore},
};
use crash_record::CrashRecord;
use std::sync::{Arc, OnceLock};

/// A caller-supplied callback invoked with the mutable, not-yet-persisted
/// record just before it is written, so the caller can add fields to
/// [`CrashRecord::extra`].
///
/// Invoked synchronously and never concurrently with another invocation.
/// Only the panic, memory-pressure and [`CrashReporter::simulate_signal`]
/// paths run it; the real signal handler persists without it, since running
/// arbitrary caller code in a compromised context is not an option.
pub type OnSaveCrash = Box<dyn Fn(&mut CrashRecord) + Send + Sync>;

/// State shared with the interceptors, which outlive any one call into the
/// reporter.
pub(crate) struct Inner {
    store: Box<dyn CrashStore>,
    config: parking_lot::Mutex<CatchConfiguration>,
    on_save: parking_lot::Mutex<Option<OnSaveCrash>>,
}

impl Inner {
    /// Runs the augmentation hook and persists the record. Normal execution
    /// context only. Persistence failure degrades to "no record available";
    /// it is never propagated, the process is usually mid-failure here.
    pub(crate) fn save(&self, mut record: CrashRecord) {
        {
            let hook = self.on_save.lock();
            if let Some(hook) = &*hook {
                hook(&mut record);
            }
        }

        if let Err(err) = self.store.write(&record) {
            log::warn!("failed to persist crash record: {err}");
        }
    }

    /// Synthesizes and persists the low-memory sentinel record. There is no
    /// backtrace; the capture point is not the eventual kill point.
    pub(crate) fn save_low_memory(&self, psi_avg10: Option<f64>) {
        let mut record = CrashRecord::new("LowMemoryWarning", "", Vec::new());
        if let Some(avg10) = psi_avg10 {
            record
                .extra
                .insert("psi_avg10".to_owned(), format!("{avg10:.2}"));
        }
        self.save(record);
    }
}

struct CatchState {
    catching: bool,
    signals_installed: bool,
    panics_installed: bool,
    watcher: Option<memory::PressureWatcher>,
}

/// Orchestrates the interceptors and fronts the store.
///
/// The typical embedding touches [`CrashReporter::shared`] once at startup
/// on the main thread: first consult [`latest_crash`](Self::latest_crash)
/// for anything the previous run left behind, then
/// [`begin_catching`](Self::begin_catching). Construction installs nothing;
/// interceptors only go in on `begin_catching`.
pub struct CrashReporter {
    inner: Arc<Inner>,
    state: parking_lot::Mutex<CatchState>,
}

static SHARED: OnceLock<CrashReporter> = OnceLock::new();

impl CrashReporter {
    /// The process-wide reporter, lazily constructed over the default
    /// [`FileStore`], living for the process lifetime.
    pub fn shared() -> &'static Self {
        SHARED.get_or_init(|| Self::with_store(Box::new(FileStore::default())))
    }

    /// A reporter over an injected store, for embedders that persist
    /// somewhere else.
    ///
    /// Construct on the main thread: the constructing thread is recorded as
    /// the target for the main-thread backtrace captured on off-main panics.
    pub fn with_store(store: Box<dyn CrashStore>) -> Self {
        stack::note_main_thread();
        Self {
            inner: Arc::new(Inner {
                store,
                config: parking_lot::Mutex::new(CatchConfiguration::default()),
                on_save: parking_lot::Mutex::new(None),
            }),
            state: parking_lot::Mutex::new(CatchState {
                catching: false,
                signals_installed: false,
                panics_installed: false,
                watcher: None,
            }),
        }
    }

    /// Installs the interceptors selected by the current configuration.
    /// A no-op when already catching.
    pub fn begin_catching(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.catching {
            return Ok(());
        }

        let config = *self.inner.config.lock();

        if config.options.contains(CatchOption::Signals) {
            match self.inner.store.raw_slot() {
                Some(slot) => {
                    signal::install(config.signals, slot)?;
                    state.signals_installed = true;
                }
                None => {
                    log::warn!(
                        "store has no signal-safe write path, signal interception disabled"
                    );
                }
            }
        }

        if config.options.contains(CatchOption::Panics) {
            panic_hook::install(self.inner.clone());
            state.panics_installed = true;
        }

        if config.options.contains(CatchOption::LowMemory) {
            state.watcher = memory::PressureWatcher::start(self.inner.clone());
        }

        state.catching = true;
        Ok(())
    }

    /// Uninstalls whatever `begin_catching` installed, restoring the
    /// previously registered handlers. A no-op when not catching.
    pub fn end_catching(&self) {
        let mut state = self.state.lock();
        if !state.catching {
            return;
        }

        if state.signals_installed {
            signal::uninstall();
            state.signals_installed = false;
        }
        if state.panics_installed {
            panic_hook::uninstall();
            state.panics_installed = false;
        }
        if let Some(mut watcher) = state.watcher.take() {
            watcher.stop();
        }

        state.catching = false;
    }

    #[inline]
    pub fn is_catching(&self) -> bool {
        self.state.lock().catching
    }

    /// True iff the store currently holds a record.
    #[inline]
    pub fn crash_available(&self) -> bool {
        self.latest_crash().is_some()
    }

    /// The persisted record from this run or a previous one, if any.
    /// An unreadable or corrupt record reads as absent.
    #[inline]
    pub fn latest_crash(&self) -> Option<CrashRecord> {
        self.inner.store.read()
    }

    /// Consumes the persisted record. Idempotent; failures are absorbed and
    /// logged, a reporter never raises while reporting.
    pub fn remove_latest_crash(&self) {
        if let Err(err) = self.inner.store.remove() {
            log::warn!("failed to remove crash record: {err}");
        }
    }

    pub fn catch_options(&self) -> CatchOptions {
        self.inner.config.lock().options
    }

    pub fn signal_mask(&self) -> SignalSet {
        self.inner.config.lock().signals
    }

    /// Replaces the interceptor category selection. Rejected while catching;
    /// configuration must never change concurrently with a fault.
    pub fn set_catch_options(&self, options: CatchOptions) -> Result<(), Error> {
        let state = self.state.lock();
        if state.catching {
            return Err(Error::AlreadyCatching);
        }
        self.inner.config.lock().options = options;
        Ok(())
    }

    /// Replaces the set of intercepted signals. Rejected while catching.
    pub fn set_signal_mask(&self, signals: SignalSet) -> Result<(), Error> {
        let state = self.state.lock();
        if state.catching {
            return Err(Error::AlreadyCatching);
        }
        self.inner.config.lock().signals = signals;
        Ok(())
    }

    /// Registers (or clears) the pre-save augmentation hook.
    pub fn set_on_save_crash(&self, hook: Option<OnSaveCrash>) {
        *self.inner.on_save.lock() = hook;
    }

    /// Drives the signal capture-and-persist path without raising a signal:
    /// same stack walk, same fixed-layout formatting, same raw write.
    ///
    /// Returns false when the signal is not currently intercepted, matching
    /// what real delivery would record. The augmentation hook is not run,
    /// just as it is not run by the real handler.
    pub fn simulate_signal(&self, signal: Signal) -> bool {
        signal::simulate(signal)
    }

    /// Synthesizes and persists a `LowMemoryWarning` record, for external
    /// memory monitors on platforms where the built-in watcher has no
    /// pressure interface to subscribe to.
    pub fn notify_memory_pressure(&self) {
        self.inner.save_low_memory(None);
    }
}
