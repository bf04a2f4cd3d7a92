#![forbid(unsafe_code)]
//! pageflow-core: shared kernel for the pageflow compute engine.
//!
//! This crate contains only *pure* types, small helpers, and interfaces
//! (traits) that other crates implement. There is **no I/O** and **no
//! allocation policy** here.
//!
//! Crates that use this:
//! - pageflow-mem: implements the `CircuitBreaker` trait and RAII reservations.
//! - pageflow-data: Blocks, Builders, Pages and the `BlockFactory`.
//! - pageflow-operators: source/intermediate/sink operators over Pages.
//! - pageflow-exec: drivers that run operator chains and report stats.

pub mod breaker;
pub mod config;
pub mod error;
pub mod id;
pub mod schema;
pub mod types;

pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
