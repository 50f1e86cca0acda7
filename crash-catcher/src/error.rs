/// An error that can occur when installing or removing interceptors, or when
/// mutating the reporter's configuration.
///
/// Note that failures *inside* a capture path are never surfaced through
/// this type; a reporter that is handling a crash absorbs its own failures
/// (see the crate docs). The only other errors callers see are the typed
/// attachment errors in [`crate::AttachmentError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// For simplicity sake, only one set of signal interceptors can be
    /// registered at any one time, process wide.
    #[error("signal interceptors are already installed")]
    HandlerAlreadyInstalled,
    /// Configuration is frozen between `begin_catching` and `end_catching`;
    /// it must never change concurrently with a fault.
    #[error("configuration cannot change while catching is active")]
    AlreadyCatching,
    /// Unable to `mmap` memory for the alternate signal stack
    #[error("unable to map memory for the alternate signal stack")]
    OutOfMemory,
    /// An I/O or other syscall failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
