use crash_catcher::{
    CatchOption, CatchOptions, CrashReporter, CrashStore, FileStore, Signal, SignalSet,
};
use std::path::PathBuf;

mod shared;

/// When set, this test binary is running as a crash child; the value is the
/// store path the parent will inspect after we die.
const STORE_ENV: &str = "CRASH_CATCHER_TEST_STORE";

/// Runs one of the `child_*` tests below in a subprocess and returns the
/// store path the child was pointed at.
fn spawn_crash_child(dir: &tempfile::TempDir, test_name: &str) -> PathBuf {
    let path = shared::store_path(dir.path());
    let status = std::process::Command::new(std::env::current_exe().unwrap())
        .arg(test_name)
        .arg("--exact")
        .arg("--nocapture")
        .env(STORE_ENV, &path)
        .status()
        .expect("failed to spawn crash child");
    // The child re-raises after persisting, so it must not exit cleanly.
    assert!(!status.success(), "crash child survived its own crash");
    path
}

fn child_store() -> Option<FileStore> {
    std::env::var_os(STORE_ENV).map(|p| FileStore::at(PathBuf::from(p)))
}

/// Child half of [`catches_real_segfault`]. A no-op in a normal test run.
#[test]
fn child_segfault() {
    let Some(store) = child_store() else {
        return;
    };
    let reporter = CrashReporter::with_store(Box::new(store));
    reporter.begin_catching().unwrap();
    unsafe { sadness_generator::raise_segfault() };
}

/// Child half of [`unmasked_signal_leaves_no_record`]. Catches only SIGABRT,
/// then dies of SIGSEGV.
#[test]
fn child_segfault_unmasked() {
    let Some(store) = child_store() else {
        return;
    };
    let reporter = CrashReporter::with_store(Box::new(store));
    reporter
        .set_signal_mask(SignalSet::only(Signal::Abort))
        .unwrap();
    reporter.begin_catching().unwrap();
    unsafe { sadness_generator::raise_segfault() };
}

#[test]
fn catches_real_segfault() {
    if std::env::var_os(STORE_ENV).is_some() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = spawn_crash_child(&dir, "child_segfault");

    let record = FileStore::at(&path)
        .read()
        .expect("child should have persisted a record before dying");
    assert_eq!(record.name, "SIGSEGV");
    assert_eq!(record.reason, "");
    assert!(!record.backtrace.is_empty());
    assert!(record.backtrace.iter().all(|f| f.symbol.is_none()));
    assert_eq!(record.hash, crash_record::fingerprint_hex(
        &record.backtrace.iter().map(|f| f.ip).collect::<Vec<_>>(),
    ));
}

#[test]
fn unmasked_signal_leaves_no_record() {
    if std::env::var_os(STORE_ENV).is_some() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = spawn_crash_child(&dir, "child_segfault_unmasked");
    assert!(
        FileStore::at(&path).read().is_none(),
        "a signal outside the mask must not produce a record"
    );
}

/// The simulated path exercises the same capture, formatting and raw-write
/// code as the real handler, without terminating the process, so the
/// in-process lifecycle properties are all checked here sequentially; signal
/// handler state is process-wide.
#[test]
fn simulated_signal_lifecycle() {
    if std::env::var_os(STORE_ENV).is_some() {
        return;
    }

    let (_dir, reporter) = shared::temp_reporter(
        CatchOptions::only(CatchOption::Signals),
        SignalSet::only(Signal::Segv).union(SignalSet::only(Signal::Abort)),
    );

    // Nothing installed yet, simulation mirrors real delivery and records
    // nothing.
    assert!(!reporter.simulate_signal(Signal::Segv));

    reporter.begin_catching().unwrap();
    // Calling again while catching is a no-op, not a double install.
    reporter.begin_catching().unwrap();
    assert!(reporter.is_catching());

    assert!(reporter.simulate_signal(Signal::Segv));
    let record = reporter.latest_crash().expect("record should be persisted");
    assert_eq!(record.name, "SIGSEGV");
    assert!(!record.backtrace.is_empty());
    assert!(record.extra.is_empty());

    // A signal outside the mask records nothing, even while catching.
    reporter.remove_latest_crash();
    assert!(!reporter.simulate_signal(Signal::Fpe));
    assert!(!reporter.crash_available());

    // The augmentation hook never runs on the signal path.
    reporter.set_on_save_crash(Some(Box::new(|record| {
        record
            .extra
            .insert("hooked".to_owned(), "yes".to_owned());
    })));
    assert!(reporter.simulate_signal(Signal::Abort));
    let record = reporter.latest_crash().unwrap();
    assert_eq!(record.name, "SIGABRT");
    assert!(record.extra.is_empty());

    reporter.end_catching();
    assert!(!reporter.is_catching());
    // Ending twice is a safe no-op.
    reporter.end_catching();

    reporter.remove_latest_crash();
    assert!(!reporter.simulate_signal(Signal::Segv));
    assert!(!reporter.crash_available());
}
