//! Run statistics and their tracing hook.
//!
//! Stats are plain serde structs; exporting them anywhere other than the log
//! is left to the binary layer.

use pageflow_core::id::{DriverId, OperatorId};
use pageflow_data::Page;
use serde::Serialize;

/// What one operator handed downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorStats {
    pub id: OperatorId,
    pub name: &'static str,
    pub pages_out: u64,
    pub positions_out: u64,
    /// Bytes charged by the emitted pages at the time they were emitted.
    pub bytes_out: u64,
}

impl OperatorStats {
    pub(crate) fn new(id: OperatorId, name: &'static str) -> Self {
        Self {
            id,
            name,
            pages_out: 0,
            positions_out: 0,
            bytes_out: 0,
        }
    }

    pub(crate) fn record(&mut self, page: &Page) {
        self.pages_out += 1;
        self.positions_out += page.position_count() as u64;
        self.bytes_out += page.ram_bytes_used() as u64;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverStats {
    pub driver_id: DriverId,
    pub iterations: u64,
    pub idle_iterations: u64,
    pub elapsed_micros: u64,
    /// Chain order, source first.
    pub operators: Vec<OperatorStats>,
}

impl DriverStats {
    /// Positions that reached the last operator of the chain.
    pub fn positions_delivered(&self) -> u64 {
        let n = self.operators.len();
        if n < 2 {
            return 0;
        }
        self.operators[n - 2].positions_out
    }
}

#[cfg(feature = "tracing")]
pub fn emit_stats(stats: &DriverStats) {
    let span = tracing::span!(tracing::Level::DEBUG, "driver", id = %stats.driver_id);
    let _enter = span.enter();
    for op in &stats.operators {
        tracing::debug!(
            op = %op.id,
            name = op.name,
            pages = op.pages_out,
            positions = op.positions_out,
            bytes = op.bytes_out,
            "operator output"
        );
    }
    tracing::debug!(
        iterations = stats.iterations,
        idle = stats.idle_iterations,
        elapsed_us = stats.elapsed_micros,
        "driver finished"
    );
}

#[cfg(not(feature = "tracing"))]
pub fn emit_stats(_stats: &DriverStats) {}
