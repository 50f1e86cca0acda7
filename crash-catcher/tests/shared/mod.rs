// Not every test binary uses every helper.
#![allow(dead_code)]

use crash_catcher::{CatchOptions, CrashReporter, FileStore, SignalSet};
use std::path::PathBuf;

/// A reporter over a store in a fresh temp directory, so tests never step on
/// the process-wide default slot or on each other.
pub fn temp_reporter(options: CatchOptions, signals: SignalSet) -> (tempfile::TempDir, CrashReporter) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let reporter = CrashReporter::with_store(Box::new(FileStore::at(store_path(dir.path()))));
    reporter
        .set_catch_options(options)
        .expect("fresh reporter cannot be catching");
    reporter
        .set_signal_mask(signals)
        .expect("fresh reporter cannot be catching");
    (dir, reporter)
}

pub fn store_path(dir: &std::path::Path) -> PathBuf {
    dir.join("latest_crash.json")
}
