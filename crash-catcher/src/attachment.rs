//! The one coupling to UI-layer code: turning the latest crash into a
//! ready-to-send mail attachment. The core never constructs or presents UI
//! itself, and these are the only errors it surfaces to calling code.

use crate::CrashReporter;

/// An attachment-ready payload built from a persisted crash record.
pub struct Attachment {
    /// Derived deterministically from the record: `crash-{hash}.json`.
    pub filename: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("no crash is available to attach")]
    NoCrashAvailable,
    #[error("failed to build the attachment payload: {0}")]
    BuildFailed(#[from] serde_json::Error),
}

/// Builds a mail attachment from the reporter's latest crash.
pub fn build_attachment(reporter: &CrashReporter) -> Result<Attachment, AttachmentError> {
    let record = reporter
        .latest_crash()
        .ok_or(AttachmentError::NoCrashAvailable)?;

    let bytes = serde_json::to_vec_pretty(&record)?;

    Ok(Attachment {
        filename: format!("crash-{}.json", record.hash),
        mime_type: "application/json",
        bytes,
    })
}
