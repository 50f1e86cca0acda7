use crash_catcher::{CatchOption, CatchOptions, SignalSet};

mod shared;

/// The panic hook is process-wide state, so the whole interception lifecycle
/// runs in one sequential test.
#[test]
fn records_uncaught_panic() {
    let (_dir, reporter) = shared::temp_reporter(
        CatchOptions::only(CatchOption::Panics),
        SignalSet::default(),
    );

    reporter.set_on_save_crash(Some(Box::new(|record| {
        record
            .extra
            .insert("app_version".to_owned(), "1.2.3".to_owned());
    })));

    reporter.begin_catching().unwrap();

    let joined = std::thread::spawn(|| panic!("boom: {}", 42)).join();
    assert!(joined.is_err());

    let record = reporter
        .latest_crash()
        .expect("the panic should have been persisted");
    assert_eq!(record.name, "RustPanic");
    assert_eq!(record.reason, "boom: 42");
    assert!(!record.backtrace.is_empty());
    // Unwind mode resolves at least some symbols in a debug test build.
    assert!(record.backtrace.iter().any(|f| f.symbol.is_some()));
    assert!(
        record
            .extra
            .get("location")
            .is_some_and(|loc| loc.contains("panic.rs"))
    );
    // The augmentation hook runs on this path.
    assert_eq!(record.extra.get("app_version").map(String::as_str), Some("1.2.3"));

    // The panic happened off the thread that constructed the reporter, so
    // the main thread was captured remotely.
    let main_bt = record
        .main_thread_backtrace
        .expect("off-main panic should carry a main thread backtrace");
    assert!(!main_bt.is_empty());

    // Once interception ends the previous hook is back and nothing new is
    // persisted.
    reporter.end_catching();
    reporter.remove_latest_crash();

    let joined = std::thread::spawn(|| panic!("after end_catching")).join();
    assert!(joined.is_err());
    assert!(!reporter.crash_available());
}
