//! engine::engine_hooks
//!
//! Test-only fault injection for the staging → live merge.
//!
//! # Usage
//!
//! ```ignore
//! use modweave::engine::engine_hooks;
//!
//! // Fail the merge after two files have been copied.
//! engine_hooks::fail_merge_after(2);
//! assert!(engine.deploy(&manifest).is_err());
//! engine_hooks::clear();
//!
//! // The journal is now `failed` and can be resumed.
//! let pending = engine.pending_merges()?;
//! engine.resume_merge(&pending[0].op_id)?;
//! ```
//!
//! # Thread Safety
//!
//! Hooks live in thread-local storage, so concurrent tests do not see each
//! other's hooks.
//!
//! # Invariants
//!
//! - Hooks exist only under `cfg(test)` or the `fault_injection` feature
//! - Each test must call `clear()` after use

use std::cell::Cell;

thread_local! {
    static FAIL_MERGE_AFTER: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Make the next merges fail once `files` entries have been merged.
pub fn fail_merge_after(files: usize) {
    FAIL_MERGE_AFTER.with(|c| c.set(Some(files)));
}

/// Clear all hooks.
pub fn clear() {
    FAIL_MERGE_AFTER.with(|c| c.set(None));
}

pub fn has_hooks() -> bool {
    FAIL_MERGE_AFTER.with(|c| c.get().is_some())
}

/// Called by the merge loop before copying each file.
pub(crate) fn check_merge(merged_so_far: usize) -> std::io::Result<()> {
    match FAIL_MERGE_AFTER.with(|c| c.get()) {
        Some(limit) if merged_so_far >= limit => Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "simulated merge failure for fault injection testing",
        )),
        _ => Ok(()),
    }
}
