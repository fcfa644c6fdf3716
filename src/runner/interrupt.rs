//! Cooperative cancellation flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared flag raised by the termination handler and polled wherever the
/// run blocks
///
/// Clones share one flag. A flag can also forward to other flags, so a
/// handle taken before a run keeps reaching the flag the run polls.
/// Raising it never blocks on the run thread, but takes a short lock, so it
/// belongs on a handler thread rather than in a raw signal handler.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
    inner: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    raised: AtomicBool,
    forward: Mutex<Vec<Interrupter>>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        // already raised flags have forwarded; this also ends forwarding cycles
        if self.inner.raised.swap(true, Ordering::SeqCst) {
            return;
        }

        for other in self.lock_forward().iter() {
            other.interrupt();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Whether both handles are the same flag
    pub fn shares(&self, other: &Interrupter) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Raise `other` whenever this flag is raised, including now if it
    /// already is
    pub fn forward_to(&self, other: &Interrupter) {
        if self.shares(other) {
            return;
        }

        self.lock_forward().push(other.clone());
        if self.is_interrupted() {
            other.interrupt();
        }
    }

    fn lock_forward(&self) -> std::sync::MutexGuard<'_, Vec<Interrupter>> {
        self.inner
            .forward
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
