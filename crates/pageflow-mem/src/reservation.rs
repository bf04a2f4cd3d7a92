//! RAII reservation against a circuit breaker.
//!
//! Anything that holds memory for a block holds a `Reservation` for exactly
//! those bytes. Dropping it returns the bytes to the breaker (panic-safe);
//! the type is not `Clone`, so a charge can only ever be released once.

use std::fmt;
use std::sync::Arc;

use pageflow_core::breaker::CircuitBreaker;
use pageflow_core::error::Result;

pub struct Reservation {
    breaker: Arc<dyn CircuitBreaker>,
    bytes: usize,
    label: &'static str,
}

impl Reservation {
    /// Charge `bytes` up front. Nothing is charged on failure.
    pub fn try_new(
        breaker: &Arc<dyn CircuitBreaker>,
        bytes: usize,
        label: &'static str,
    ) -> Result<Self> {
        breaker.try_reserve(bytes, label)?;
        Ok(Self {
            breaker: Arc::clone(breaker),
            bytes,
            label,
        })
    }

    /// Number of bytes currently accounted for by this reservation.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn breaker(&self) -> &Arc<dyn CircuitBreaker> {
        &self.breaker
    }

    /// Grow or shrink the charge to `new_bytes`.
    ///
    /// Shrinking always succeeds. Growing charges only the delta and leaves the
    /// reservation untouched if the breaker refuses it.
    pub fn try_resize(&mut self, new_bytes: usize) -> Result<()> {
        if new_bytes > self.bytes {
            self.breaker
                .try_reserve(new_bytes - self.bytes, self.label)?;
        } else if new_bytes < self.bytes {
            self.breaker.release(self.bytes - new_bytes);
        }
        self.bytes = new_bytes;
        Ok(())
    }

    /// Return every byte now. Idempotent; drop after this is a no-op.
    pub fn release(&mut self) {
        if self.bytes > 0 {
            self.breaker.release(self.bytes);
            // NOTE: do not log here to keep the drop path fast.
            self.bytes = 0;
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("breaker", &self.breaker.name())
            .field("bytes", &self.bytes)
            .field("label", &self.label)
            .finish()
    }
}
