//! Abstract circuit-breaker interface.
//!
//! The concrete implementations live in `pageflow-mem`. We keep only the trait
//! here so any crate can depend on the API without pulling the ledger logic.

use crate::error::Result;

/// A memory-ceiling enforcer shared by every allocation in a pipeline.
///
/// Implementations must be atomic with respect to concurrent callers: two
/// racing `try_reserve` calls may never together push `used_bytes` past
/// `limit_bytes`, and `release` may never drive the ledger negative.
pub trait CircuitBreaker: Send + Sync + 'static {
    /// Charge `bytes` against the ceiling, or fail with
    /// `Error::MemoryLimitExceeded` without charging anything.
    fn try_reserve(&self, bytes: usize, label: &'static str) -> Result<()>;

    /// Return `bytes` previously charged with `try_reserve`.
    fn release(&self, bytes: usize);

    /// Configured ceiling (bytes).
    fn limit_bytes(&self) -> usize;

    /// Bytes currently charged.
    fn used_bytes(&self) -> usize;

    /// Highest value `used_bytes` has reached.
    fn peak_bytes(&self) -> usize;

    /// Optional name for logs and stats.
    fn name(&self) -> &'static str {
        "breaker"
    }
}

// NOTE: Do *not* add default impls here that would silently "allow" allocations.
// Reservations are only ever constructed in the mem crate.
