#![forbid(unsafe_code)]
//! pageflow: memory-accounted columnar pages and pull-based operator
//! pipelines.
//!
//! This crate re-exports the workspace crates under one roof:
//! - [`core`]: element kinds, values, errors, config, breaker trait
//! - [`mem`]: circuit breakers and RAII reservations
//! - [`data`]: blocks, builders, pages and the `BlockFactory`
//! - [`operators`]: sources, intermediates and sinks
//! - [`exec`]: drivers and the engine

pub use pageflow_core as core;
pub use pageflow_data as data;
pub use pageflow_exec as exec;
pub use pageflow_mem as mem;
pub use pageflow_operators as operators;

pub use pageflow_core::config::EngineConfig;
pub use pageflow_core::{Error, Result};
pub use pageflow_data::{Block, BlockFactory, Page};
pub use pageflow_exec::{CancelHandle, Driver, DriverStats, Engine, ExecError};
pub use pageflow_operators::{BoxedOperator, Operator};
