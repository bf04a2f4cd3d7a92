//! Concrete circuit breakers.
//!
//! `MemoryBreaker` is the ledger used in production: an atomic counter that
//! refuses any reservation pushing it past the ceiling. `NoopBreaker` counts
//! the same way but has no ceiling; useful for tools that only want accounting.

use std::sync::atomic::{AtomicUsize, Ordering};

use pageflow_core::breaker::CircuitBreaker;
use pageflow_core::error::{Error, Result};

use crate::tracking::PeakTracker;

/// Lock-free ledger with a hard ceiling.
#[derive(Debug)]
pub struct MemoryBreaker {
    name: &'static str,
    limit: usize,
    used: AtomicUsize,
    peak: PeakTracker,
}

impl MemoryBreaker {
    pub fn new(limit_bytes: usize) -> Self {
        Self::named("memory", limit_bytes)
    }

    pub fn named(name: &'static str, limit_bytes: usize) -> Self {
        Self {
            name,
            limit: limit_bytes,
            used: AtomicUsize::new(0),
            peak: PeakTracker::new(),
        }
    }
}

impl CircuitBreaker for MemoryBreaker {
    fn try_reserve(&self, bytes: usize, label: &'static str) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        let mut cur = self.used.load(Ordering::Relaxed);
        loop {
            let next = cur.saturating_add(bytes);
            if next > self.limit {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    breaker = self.name,
                    label,
                    requested = bytes,
                    used = cur,
                    limit = self.limit,
                    "circuit breaker tripped"
                );
                return Err(Error::MemoryLimitExceeded {
                    label,
                    requested: bytes,
                    limit: self.limit,
                    used: cur,
                });
            }
            match self
                .used
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    self.peak.record_used(next);
                    return Ok(());
                }
                Err(observed) => cur = observed,
            }
        }
    }

    fn release(&self, bytes: usize) {
        release_saturating(&self.used, bytes, self.name);
    }

    fn limit_bytes(&self) -> usize {
        self.limit
    }

    fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    fn peak_bytes(&self) -> usize {
        self.peak.peak()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Accounting-only breaker: tracks usage and refuses only a reservation the
/// ledger itself cannot represent.
#[derive(Debug, Default)]
pub struct NoopBreaker {
    used: AtomicUsize,
    peak: PeakTracker,
}

impl NoopBreaker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CircuitBreaker for NoopBreaker {
    fn try_reserve(&self, bytes: usize, label: &'static str) -> Result<()> {
        match self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |cur| cur.checked_add(bytes))
        {
            Ok(prev) => {
                self.peak.record_used(prev + bytes);
                Ok(())
            }
            Err(cur) => Err(Error::MemoryLimitExceeded {
                label,
                requested: bytes,
                limit: usize::MAX,
                used: cur,
            }),
        }
    }

    fn release(&self, bytes: usize) {
        release_saturating(&self.used, bytes, "noop");
    }

    fn limit_bytes(&self) -> usize {
        usize::MAX
    }

    fn used_bytes(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    fn peak_bytes(&self) -> usize {
        self.peak.peak()
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Subtract `bytes` without ever wrapping below zero.
///
/// Reservations release exactly what they charged, so an underflow here is a
/// bookkeeping bug; it is clamped and reported rather than wrapped.
fn release_saturating(used: &AtomicUsize, bytes: usize, name: &'static str) {
    if bytes == 0 {
        return;
    }
    let result = used.fetch_update(Ordering::AcqRel, Ordering::Relaxed, |cur| {
        Some(cur.saturating_sub(bytes))
    });
    if let Ok(prev) = result {
        if prev < bytes {
            debug_assert!(false, "breaker '{name}' released {bytes} bytes with only {prev} charged");
            #[cfg(feature = "tracing")]
            tracing::error!(breaker = name, released = bytes, charged = prev, "breaker ledger underflow");
        }
    }
}
