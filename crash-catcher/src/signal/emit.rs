//! Fixed-layout record serialization for the signal handler.
//!
//! The normal persistence path serializes a [`crash_record::CrashRecord`]
//! with serde_json. Inside a signal handler serde is off the table, so this
//! module formats the same JSON schema by hand into a preallocated buffer:
//! fixed keys, a static signal name, decimal instruction pointers, and a
//! hand-rendered hex fingerprint. The reader cannot tell the two writers
//! apart.

use crate::stack::FrameBuf;

/// Formatting buffer size. Worst case is [`crate::MAX_FRAMES`] frames at
/// ~45 bytes apiece plus the envelope, comfortably under this.
pub(crate) const SIG_BUF_CAP: usize = 16 * 1024;

/// A preallocated byte buffer with append-only formatting helpers.
///
/// Every push reports whether it fit; an overflowing record is abandoned
/// rather than truncated, since a truncated file would just parse as "no
/// crash" anyway.
pub(crate) struct SigBuf {
    bytes: [u8; SIG_BUF_CAP],
    len: usize,
}

impl SigBuf {
    pub(crate) const fn new() -> Self {
        Self {
            bytes: [0; SIG_BUF_CAP],
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    pub(crate) fn push_bytes(&mut self, s: &[u8]) -> bool {
        if self.len + s.len() > SIG_BUF_CAP {
            return false;
        }
        self.bytes[self.len..self.len + s.len()].copy_from_slice(s);
        self.len += s.len();
        true
    }

    /// Renders a decimal number without going through `core::fmt`.
    pub(crate) fn push_decimal(&mut self, mut val: u64) -> bool {
        let mut digits = [0u8; 20];
        let mut i = 0;
        loop {
            digits[i] = b'0' + (val % 10) as u8;
            val /= 10;
            i += 1;
            if val == 0 {
                break;
            }
        }
        digits[..i].reverse();
        self.push_bytes(&digits[..i])
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Formats a complete crash record for the given signal into `out`.
///
/// Returns false if the record did not fit, in which case `out` contents are
/// unspecified and must not be persisted.
pub(crate) fn emit_record(out: &mut SigBuf, name: &'static str, frames: &FrameBuf) -> bool {
    let fp = crash_record::fingerprint(frames.ips());
    let mut hash = [0u8; crash_record::FINGERPRINT_LEN * 2];
    crash_record::render_hex(&fp, &mut hash);

    out.clear();
    let mut ok = out.push_bytes(b"{\"name\":\"");
    ok &= out.push_bytes(name.as_bytes());
    ok &= out.push_bytes(b"\",\"reason\":\"\",\"backtrace\":[");
    for (i, ip) in frames.ips().iter().enumerate() {
        if i > 0 {
            ok &= out.push_bytes(b",");
        }
        ok &= out.push_bytes(b"{\"ip\":");
        ok &= out.push_decimal(*ip as u64);
        ok &= out.push_bytes(b",\"symbol\":null}");
    }
    ok &= out.push_bytes(b"],\"main_thread_backtrace\":null,\"hash\":\"");
    ok &= out.push_bytes(&hash);
    ok &= out.push_bytes(b"\",\"extra\":{}}\n");
    ok
}

#[cfg(test)]
mod test {
    use super::*;
    use crash_record::CrashRecord;

    #[test]
    fn emitted_record_matches_the_serde_schema() {
        let mut frames = FrameBuf::new();
        frames.push(0x1000);
        frames.push(0x2000);
        frames.push(usize::MAX);

        let mut buf = SigBuf::new();
        assert!(emit_record(&mut buf, "SIGSEGV", &frames));

        let record: CrashRecord = serde_json::from_slice(buf.as_slice()).unwrap();
        assert_eq!(record.name, "SIGSEGV");
        assert_eq!(record.reason, "");
        assert_eq!(
            record.backtrace.iter().map(|f| f.ip).collect::<Vec<_>>(),
            vec![0x1000, 0x2000, usize::MAX]
        );
        assert!(record.backtrace.iter().all(|f| f.symbol.is_none()));
        assert_eq!(record.main_thread_backtrace, None);
        assert_eq!(record.hash, crash_record::fingerprint_hex(frames.ips()));
        assert!(record.extra.is_empty());
    }

    #[test]
    fn full_frame_buffer_still_fits() {
        let mut frames = FrameBuf::new();
        while frames.push(usize::MAX) {}

        let mut buf = SigBuf::new();
        assert!(emit_record(&mut buf, "SIGABRT", &frames));
        assert!(serde_json::from_slice::<CrashRecord>(buf.as_slice()).is_ok());
    }

    #[test]
    fn decimal_rendering() {
        let mut buf = SigBuf::new();
        assert!(buf.push_decimal(0));
        assert!(buf.push_bytes(b" "));
        assert!(buf.push_decimal(u64::MAX));
        assert_eq!(buf.as_slice(), format!("0 {}", u64::MAX).as_bytes());
    }
}
