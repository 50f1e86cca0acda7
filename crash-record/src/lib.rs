//! Provides [`CrashRecord`], the portable description of one abnormal process
//! termination, shared between the code that captures a crash and the code
//! that reads it back on the next launch.
//!
//! A record is deliberately small and self-describing: a short `name`
//! identifying what killed the process (a signal name such as `SIGSEGV`, the
//! panic tag `RustPanic`, or the `LowMemoryWarning` sentinel), an optional
//! human readable `reason`, the raw backtrace of the faulting thread, and a
//! deterministic fingerprint over the backtrace that consumers can use for
//! deduplication.
//!
//! Frames carry raw instruction pointers. Symbol names are attached only when
//! they could be resolved cheaply at capture time; records written from a
//! signal handler never carry them. Symbolication proper is a consumer
//! concern, not ours.

// BEGIN - Embark standard lints v6 for Rust 1.55+
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::flat_map_option,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::from_iter_instead_of_collect,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_digit_groups,
    clippy::large_stack_arrays,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_on_vec_items,
    clippy::match_same_arms,
    clippy::match_wild_err_arm,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::mismatched_target_os,
    clippy::missing_enforced_import_renames,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::needless_for_each,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::rc_mutex,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::single_match_else,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v6 for Rust 1.55+
// crate-specific exceptions:

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Number of bytes in a crash [`fingerprint`].
pub const FINGERPRINT_LEN: usize = 8;

/// A single stack frame as captured at crash time.
///
/// `ip` is the raw instruction pointer. `symbol` is only present when the
/// frame was captured in a context where symbol resolution was safe and the
/// resolution actually succeeded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub ip: usize,
    pub symbol: Option<String>,
}

impl Frame {
    /// A frame carrying only a raw instruction pointer.
    #[inline]
    pub fn raw(ip: usize) -> Self {
        Self { ip, symbol: None }
    }
}

/// The captured description of one failure.
///
/// Once a record has been persisted it is immutable; the augmentation hook
/// exposed by the reporter runs against the not-yet-persisted record only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashRecord {
    /// Short identifier: signal name, panic tag, or a synthetic sentinel
    /// such as `LowMemoryWarning`.
    pub name: String,
    /// Human readable explanation. Empty for signals, which carry no message.
    pub reason: String,
    /// Backtrace of the faulting thread, innermost frame first.
    pub backtrace: Vec<Frame>,
    /// Backtrace of the main thread, captured when the fault occurred on a
    /// different thread and the main thread could still be walked.
    pub main_thread_backtrace: Option<Vec<Frame>>,
    /// Hex rendering of the [`fingerprint`] over `backtrace`.
    pub hash: String,
    /// Open mapping the reporter's save hook may extend before persistence.
    pub extra: BTreeMap<String, String>,
}

impl CrashRecord {
    /// Builds a record from a name, reason and backtrace, deriving `hash`
    /// from the frame instruction pointers.
    pub fn new(name: impl Into<String>, reason: impl Into<String>, backtrace: Vec<Frame>) -> Self {
        let ips: Vec<usize> = backtrace.iter().map(|f| f.ip).collect();
        Self {
            name: name.into(),
            reason: reason.into(),
            backtrace,
            main_thread_backtrace: None,
            hash: fingerprint_hex(&ips),
            extra: BTreeMap::new(),
        }
    }
}

/// Computes the deduplication fingerprint for a sequence of frame
/// instruction pointers.
///
/// This is the first [`FINGERPRINT_LEN`] bytes of a SHA-256 over the pointers
/// in capture order. The computation uses only fixed-size state so it is
/// callable from a signal handler.
pub fn fingerprint(ips: &[usize]) -> [u8; FINGERPRINT_LEN] {
    let mut hasher = Sha256::new();
    for ip in ips {
        hasher.update((*ip as u64).to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut out = [0u8; FINGERPRINT_LEN];
    out.copy_from_slice(&digest[..FINGERPRINT_LEN]);
    out
}

/// [`fingerprint`] rendered as lowercase hex.
#[inline]
pub fn fingerprint_hex(ips: &[usize]) -> String {
    hex::encode(fingerprint(ips))
}

/// Renders a fingerprint as lowercase hex into a caller-provided buffer,
/// without allocating. Used by the signal-safe persistence path.
pub fn render_hex(fp: &[u8; FINGERPRINT_LEN], out: &mut [u8; FINGERPRINT_LEN * 2]) {
    const TABLE: &[u8; 16] = b"0123456789abcdef";
    for (i, b) in fp.iter().enumerate() {
        out[i * 2] = TABLE[(b >> 4) as usize];
        out[i * 2 + 1] = TABLE[(b & 0xf) as usize];
    }
}
