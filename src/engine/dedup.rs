//! Deduplicated diagnostics.
//!
//! Matching the same utterance against the same grammar would otherwise report a
//! dangling reference once per backtracking branch, and linking reports it again
//! on every commit. Warnings go through [`warn_once`], which remembers the text of
//! everything it has already emitted.
//!
//! The memory is process-wide and bounded: once `MAX_REMEMBERED` distinct
//! messages have been seen the set is cleared and reporting starts over.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Mutex;

const MAX_REMEMBERED: usize = 4096;

static REPORTED: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Emit `message` at warn level unless it was already emitted. Returns whether it
/// was emitted this time.
pub(crate) fn warn_once(message: String) -> bool {
    let mut reported = REPORTED.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if reported.contains(&message) {
        return false;
    }
    if reported.len() >= MAX_REMEMBERED {
        reported.clear();
    }
    log::warn!("{}", message);
    reported.insert(message);
    true
}
