//! Memory-pressure observation.
//!
//! An OS-initiated kill under memory pressure gives the process no chance to
//! run a handler, so the warning record has to be persisted *before* the
//! kill, as soon as pressure is observed. On Linux a watcher thread polls
//! the [PSI](https://docs.kernel.org/accounting/psi.html) memory file; other
//! platforms rely on [`crate::CrashReporter::notify_memory_pressure`] being
//! driven by an external monitor.

use crate::reporter::Inner;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering::SeqCst},
};

/// `some avg10` percentage past which a warning record is persisted.
#[cfg(target_os = "linux")]
const PRESSURE_THRESHOLD: f64 = 10.0;

#[cfg(target_os = "linux")]
const PSI_MEMORY_PATH: &str = "/proc/pressure/memory";

#[cfg(target_os = "linux")]
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(250);

pub(crate) struct PressureWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl PressureWatcher {
    /// Starts the watcher thread. Returns `None` on platforms without a
    /// pressure interface, or when the thread cannot be spawned.
    pub(crate) fn start(inner: Arc<Inner>) -> Option<Self> {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "linux")] {
                let stop = Arc::new(AtomicBool::new(false));
                let thread_stop = stop.clone();
                let handle = std::thread::Builder::new()
                    .name("crash-catcher-psi".to_owned())
                    .spawn(move || watch(&inner, &thread_stop))
                    .ok()?;
                Some(Self {
                    stop,
                    handle: Some(handle),
                })
            } else {
                let _ = inner;
                None
            }
        }
    }

    pub(crate) fn stop(&mut self) {
        self.stop.store(true, SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(target_os = "linux")]
fn watch(inner: &Inner, stop: &AtomicBool) {
    // Re-arm only after pressure has receded, one record per episode.
    let mut armed = true;

    while !stop.load(SeqCst) {
        if let Some(avg10) = read_psi_avg10() {
            if armed && avg10 >= PRESSURE_THRESHOLD {
                log::info!("memory pressure at {avg10:.2}%, persisting low-memory record");
                inner.save_low_memory(Some(avg10));
                armed = false;
            } else if avg10 < PRESSURE_THRESHOLD {
                armed = true;
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(target_os = "linux")]
fn read_psi_avg10() -> Option<f64> {
    let text = std::fs::read_to_string(PSI_MEMORY_PATH).ok()?;
    parse_psi_avg10(&text)
}

/// Extracts the `some avg10` field from PSI file contents.
#[cfg(any(target_os = "linux", test))]
fn parse_psi_avg10(text: &str) -> Option<f64> {
    let line = text.lines().find(|line| line.starts_with("some"))?;
    let field = line
        .split_whitespace()
        .find_map(|token| token.strip_prefix("avg10="))?;
    field.parse().ok()
}
