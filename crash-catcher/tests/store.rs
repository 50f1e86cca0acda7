use crash_catcher::{CrashRecord, CrashStore, FileStore, Frame};

mod shared;

fn sample_record(name: &str) -> CrashRecord {
    CrashRecord::new(name, "something broke", vec![Frame::raw(0x1000), Frame {
        ip: 0x2000,
        symbol: Some("app::main".to_owned()),
    }])
}

#[test]
fn write_then_read_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::at(shared::store_path(dir.path()));

    assert!(store.read().is_none());

    let record = sample_record("RustPanic");
    store.write(&record).unwrap();
    assert_eq!(store.read().unwrap(), record);

    // The atomic sequence must not leave its temp file behind.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("latest_crash.json")]);
}

#[test]
fn newest_record_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::at(shared::store_path(dir.path()));

    store.write(&sample_record("SIGSEGV")).unwrap();
    store.write(&sample_record("SIGABRT")).unwrap();

    assert_eq!(store.read().unwrap().name, "SIGABRT");
}

#[test]
fn corrupt_record_reads_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let path = shared::store_path(dir.path());
    let store = FileStore::at(&path);

    std::fs::write(&path, b"not json at all").unwrap();
    assert!(store.read().is_none());

    // Truncated mid-document, as a crash during a non-atomic write would
    // leave it.
    let full = serde_json::to_vec(&sample_record("SIGBUS")).unwrap();
    std::fs::write(&path, &full[..full.len() / 2]).unwrap();
    assert!(store.read().is_none());

    // A valid record written afterwards is readable again.
    store.write(&sample_record("SIGBUS")).unwrap();
    assert_eq!(store.read().unwrap().name, "SIGBUS");
}

#[test]
fn remove_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::at(shared::store_path(dir.path()));

    // Removing when nothing was ever written is a no-op.
    store.remove().unwrap();

    store.write(&sample_record("SIGFPE")).unwrap();
    store.remove().unwrap();
    assert!(store.read().is_none());
    store.remove().unwrap();
}

#[test]
fn store_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::at(dir.path().join("deeply").join("nested").join("crash.json"));
    store.write(&sample_record("SIGILL")).unwrap();
    assert_eq!(store.read().unwrap().name, "SIGILL");
}
