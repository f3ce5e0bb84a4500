//! Cooperative cancellation for long-running loops.
//!
//! Every component in this workspace is single-threaded and synchronous (see the crate-level
//! concurrency notes in `pakrat-godot`), so there's no way for a caller on another thread to
//! interrupt an in-progress archive scan or MD5 pass except by asking nicely. [`Cancellation`]
//! is that nicety: a caller-owned flag, checked periodically by the core, instead of every loop
//! polling some global or requiring `async`.

use core::sync::atomic::{AtomicBool, Ordering};

/// A handle a caller can share with the core to request an in-progress operation stop early.
///
/// Checked every `CHECK_INTERVAL` elements by loops that support cancellation (archive directory
/// scans, MD5 verification passes, Variant array decoding). Cancellation never leaves a partial
/// on-disk artifact, since the only things that write to disk are writers the caller drives
/// explicitly.
#[derive(Debug, Default)]
pub struct Cancellation {
    flag: AtomicBool,
}

impl Cancellation {
    /// How often (in elements processed) a loop should re-check [`is_cancelled`](Self::is_cancelled).
    pub const CHECK_INTERVAL: usize = 256;

    /// Creates a fresh, non-cancelled handle.
    #[must_use]
    pub const fn new() -> Self {
        Self { flag: AtomicBool::new(false) }
    }

    /// Requests cancellation. Idempotent.
    #[inline]
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns whether cancellation has been requested.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// A handle that never cancels, for callers that don't need the capability.
#[must_use]
pub const fn never() -> Cancellation {
    Cancellation::new()
}
