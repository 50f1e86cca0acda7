//! The durable single-slot crash store.
//!
//! At most one record lives on disk at a time; a new crash overwrites an
//! unconsumed older one. Every write goes through the same atomic sequence,
//! write to a sibling temp path then rename over the destination, so no
//! reader ever observes a half-written file, even if the process dies
//! mid-write.
//!
//! There are two writers with one schema: the normal path serializes with
//! serde_json, and [`raw_write`] lands preformatted bytes using only
//! syscalls that are safe inside a signal handler, on paths prepared ahead
//! of the crash as NUL-terminated byte arrays (a path cannot be converted to
//! a C string once the process is already faulting).

use crate::Error;
use crash_record::CrashRecord;
use std::{
    fs::File,
    io::Write as _,
    os::unix::ffi::OsStrExt as _,
    path::{Path, PathBuf},
};

/// The persistence contract the interceptors write through.
///
/// Implement this to substitute an alternate storage backend without
/// touching interceptor logic; pass it to
/// [`crate::CrashReporter::with_store`].
pub trait CrashStore: Send + Sync {
    /// Durably persists one record, replacing any previous one. Must be
    /// atomic: a crash mid-write leaves either the old record or the new
    /// one, never a torn file.
    fn write(&self, record: &CrashRecord) -> Result<(), Error>;

    /// Returns the persisted record. Absence, unreadable storage and parse
    /// failure all read as `None`; a broken store must never look like an
    /// error to the caller.
    fn read(&self) -> Option<CrashRecord>;

    /// Deletes the persisted record. Removing an absent record is a no-op.
    fn remove(&self) -> Result<(), Error>;

    /// Pre-resolved paths for the signal handler's raw write path, or `None`
    /// if this backend cannot be written from a signal handler, in which
    /// case signal catching is skipped for it.
    fn raw_slot(&self) -> Option<RawSlot> {
        None
    }
}

/// Longest path, including the terminating NUL, usable by the raw write
/// path.
const RAW_PATH_MAX: usize = 1024;

/// Temp and destination paths, pre-rendered as NUL-terminated byte arrays so
/// the signal handler never has to build a C string.
pub struct RawSlot {
    tmp: [u8; RAW_PATH_MAX],
    dst: [u8; RAW_PATH_MAX],
}

impl RawSlot {
    fn from_paths(tmp: &Path, dst: &Path) -> Option<Self> {
        fn fill(buf: &mut [u8; RAW_PATH_MAX], path: &Path) -> bool {
            let bytes = path.as_os_str().as_bytes();
            // Leave at least one trailing NUL.
            if bytes.len() >= RAW_PATH_MAX || bytes.contains(&0) {
                return false;
            }
            buf[..bytes.len()].copy_from_slice(bytes);
            true
        }

        let mut slot = Self {
            tmp: [0; RAW_PATH_MAX],
            dst: [0; RAW_PATH_MAX],
        };
        (fill(&mut slot.tmp, tmp) && fill(&mut slot.dst, dst)).then_some(slot)
    }
}

/// Writes `bytes` through the slot's temp path and renames it over the
/// destination, using only async-signal-safe syscalls.
///
/// Returns false on any failure; the caller is mid-crash and there is
/// nothing useful to do about it.
pub(crate) fn raw_write(slot: &RawSlot, bytes: &[u8]) -> bool {
    unsafe {
        let fd = libc::open(
            slot.tmp.as_ptr().cast(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_CLOEXEC,
            0o600,
        );
        if fd < 0 {
            return false;
        }

        let mut written = 0;
        while written < bytes.len() {
            let n = libc::write(fd, bytes.as_ptr().add(written).cast(), bytes.len() - written);
            if n > 0 {
                written += n as usize;
            } else if std::io::Error::last_os_error().kind() != std::io::ErrorKind::Interrupted {
                libc::close(fd);
                return false;
            }
        }

        // The record has to reach stable storage before the process dies.
        libc::fsync(fd);
        libc::close(fd);

        libc::rename(slot.tmp.as_ptr().cast(), slot.dst.as_ptr().cast()) == 0
    }
}

/// File-backed [`CrashStore`] holding the single latest crash at a fixed
/// path.
pub struct FileStore {
    path: PathBuf,
    tmp: PathBuf,
}

impl FileStore {
    /// A store rooted at the given destination path. The temp file used by
    /// the atomic write sequence is a `.tmp`-suffixed sibling.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp_name = path.file_name().map_or_else(
            || std::ffi::OsString::from("latest_crash.json"),
            ToOwned::to_owned,
        );
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);
        Self { path, tmp }
    }

    /// The destination path records are persisted to.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileStore {
    /// A per-user location under the system temp directory. Embedders that
    /// need the record to survive a reboot should inject their own path via
    /// [`FileStore::at`].
    fn default() -> Self {
        Self::at(
            std::env::temp_dir()
                .join("crash-catcher")
                .join("latest_crash.json"),
        )
    }
}

impl CrashStore for FileStore {
    fn write(&self, record: &CrashRecord) -> Result<(), Error> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let json = serde_json::to_vec(record).map_err(std::io::Error::from)?;

        let mut file = File::create(&self.tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&self.tmp, &self.path)?;
        Ok(())
    }

    fn read(&self) -> Option<CrashRecord> {
        let bytes = std::fs::read(&self.path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(record) => Some(record),
            Err(err) => {
                log::warn!("persisted crash record failed to parse, treating as absent: {err}");
                None
            }
        }
    }

    fn remove(&self) -> Result<(), Error> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn raw_slot(&self) -> Option<RawSlot> {
        // The handler cannot create directories; make sure the destination
        // exists while we still can.
        if let Some(dir) = self.path.parent() {
            if let Err(err) = std::fs::create_dir_all(dir) {
                log::warn!("cannot prepare crash store directory: {err}");
                return None;
            }
        }
        RawSlot::from_paths(&self.tmp, &self.path)
    }
}
