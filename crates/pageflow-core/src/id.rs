//! Identifiers for drivers and the operators inside them.
//!
//! Ids are per-process counters, not globally unique; they only need to tell
//! pipeline instances apart in logs and stats.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! new_id {
    ($name:ident, $prefix:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

new_id!(DriverId, "driver");
new_id!(OperatorId, "op");

/// Monotonic id source shared by everything that spawns drivers.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    pub fn next_driver(&self) -> DriverId {
        DriverId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_prefixed() {
        let ids = IdGenerator::new();
        let a = ids.next_driver();
        let b = ids.next_driver();
        assert_eq!(b.get(), a.get() + 1);
        assert_eq!(a.to_string(), "driver-0");
        assert_eq!(OperatorId::new(3).to_string(), "op-3");
    }
}
