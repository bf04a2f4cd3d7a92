//! Peak usage tracking for breakers.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PeakTracker {
    peak_bytes: AtomicUsize,
}

impl PeakTracker {
    pub const fn new() -> Self {
        Self {
            peak_bytes: AtomicUsize::new(0),
        }
    }

    /// Record a new "used bytes" value; raises the peak if higher.
    pub fn record_used(&self, used_bytes: usize) {
        let previous = self.peak_bytes.fetch_max(used_bytes, Ordering::AcqRel);
        #[cfg(feature = "tracing")]
        {
            if used_bytes > previous {
                tracing::trace!(used_bytes, previous_peak = previous, "breaker peak raised");
            }
        }
        #[cfg(not(feature = "tracing"))]
        let _ = previous;
    }

    pub fn peak(&self) -> usize {
        self.peak_bytes.load(Ordering::Acquire)
    }
}
