#![forbid(unsafe_code)]
//! pageflow-exec: drivers, cancellation and the engine that runs them.
//!
//! A `Driver` owns one operator chain and runs it on the calling thread. The
//! `Engine` owns the configuration and the shared `BlockFactory`, hands out
//! drivers and can run several of them on scoped worker threads.

pub mod driver;
pub mod metrics;
pub mod runtime;

pub use driver::{CancelHandle, Driver};
pub use metrics::{DriverStats, OperatorStats};
pub use runtime::{Engine, ExecError};
