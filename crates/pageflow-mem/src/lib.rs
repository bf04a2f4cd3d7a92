#![forbid(unsafe_code)]
//! pageflow-mem: circuit breakers and RAII memory reservations.
//!
//! This crate provides concrete implementations for the `CircuitBreaker`
//! interface defined in `pageflow-core::breaker`. Every byte a block holds is
//! charged through a [`Reservation`] obtained here, so the ceiling is enforced
//! before anything is allocated and released exactly once on drop.

pub mod breaker;
pub mod reservation;
pub mod tracking;

pub use breaker::{MemoryBreaker, NoopBreaker};
pub use reservation::Reservation;
pub use tracking::PeakTracker;

use std::sync::Arc;

use pageflow_core::breaker::CircuitBreaker;

/// Shared handle every reservation keeps back to its ledger.
pub type BreakerRef = Arc<dyn CircuitBreaker>;
