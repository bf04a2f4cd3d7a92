//! Single-threaded driver for one pipeline instance.
//!
//! Each iteration walks the chain from the source down, moving at most one
//! page across every boundary whose downstream side wants input. When an
//! operator finishes, its downstream neighbour is told to `finish`, and the
//! finished operator is closed together with everything upstream of it. That
//! is how a satisfied limit stops its source early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pageflow_core::id::{DriverId, OperatorId};
use pageflow_operators::BoxedOperator;

use crate::metrics::{emit_stats, DriverStats, OperatorStats};
use crate::runtime::ExecError;

/// Idle passes that only yield before the driver starts parking.
const SPIN_IDLE_PASSES: usize = 16;

/// Longest park between two idle passes; also bounds cancel latency.
const MAX_IDLE_PARK: Duration = Duration::from_millis(1);

/// Back off after `idle` consecutive passes without progress: yield first,
/// then park for an exponentially growing, capped interval.
fn idle_backoff(idle: usize) {
    if idle <= SPIN_IDLE_PASSES {
        std::thread::yield_now();
    } else {
        let shift = (idle - SPIN_IDLE_PASSES).min(10) as u32;
        std::thread::park_timeout(Duration::from_micros(1u64 << shift).min(MAX_IDLE_PARK));
    }
}

/// Cross-thread cancellation flag for one or more drivers.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

struct Slot {
    op: BoxedOperator,
    stats: OperatorStats,
}

pub struct Driver {
    id: DriverId,
    /// Operators still running, upstream first.
    active: Vec<Slot>,
    /// Stats of closed operators, in chain order.
    retired: Vec<OperatorStats>,
    cancel: CancelHandle,
    max_idle_iterations: usize,
    iterations: u64,
    idle_iterations: u64,
}

impl Driver {
    /// A chain needs at least a source and a sink.
    pub fn new(id: DriverId, operators: Vec<BoxedOperator>) -> Result<Self, ExecError> {
        if operators.len() < 2 {
            return Err(ExecError::Invalid(format!(
                "a driver needs a source and a sink, got {} operator(s)",
                operators.len()
            )));
        }
        let active = operators
            .into_iter()
            .enumerate()
            .map(|(i, op)| {
                let stats = OperatorStats::new(OperatorId::new(i as u64), op.name());
                Slot { op, stats }
            })
            .collect();
        Ok(Self {
            id,
            active,
            retired: Vec::new(),
            cancel: CancelHandle::new(),
            max_idle_iterations: usize::MAX,
            iterations: 0,
            idle_iterations: 0,
        })
    }

    /// Fail with `Stalled` after this many consecutive iterations without
    /// progress.
    pub fn with_max_idle_iterations(mut self, n: usize) -> Self {
        self.max_idle_iterations = n.max(1);
        self
    }

    /// Replace the cancel flag, e.g. to share one across drivers.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> DriverId {
        self.id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Every operator has finished and been closed.
    pub fn is_done(&self) -> bool {
        self.active.is_empty()
    }

    /// One pass over the chain. Returns whether anything moved or changed.
    pub fn run_once(&mut self) -> Result<bool, ExecError> {
        if self.cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        self.iterations += 1;
        let mut moved = false;

        for i in 0..self.active.len().saturating_sub(1) {
            let (head, tail) = self.active.split_at_mut(i + 1);
            let current = &mut head[i];
            let next = &mut tail[0];

            if !current.op.is_finished() && next.op.needs_input() {
                if let Some(page) = current.op.get_output()? {
                    current.stats.record(&page);
                    next.op.add_input(page)?;
                    moved = true;
                }
            }

            if current.op.is_finished() && !next.op.is_finished() {
                next.op.finish();
            }
        }

        // close the last finished operator and everything upstream of it
        if let Some(index) = self.active.iter().rposition(|s| s.op.is_finished()) {
            for mut slot in self.active.drain(..=index) {
                slot.op.close();
                #[cfg(feature = "tracing")]
                tracing::trace!(driver = %self.id, op = %slot.stats.id, name = slot.stats.name, "operator retired");
                self.retired.push(slot.stats);
            }
            moved = true;
        }
        Ok(moved)
    }

    /// Drive the chain until every operator has finished. On any error every
    /// operator is closed before the error is returned.
    pub fn run(&mut self) -> Result<DriverStats, ExecError> {
        let started = Instant::now();
        let mut idle = 0usize;
        let outcome = loop {
            if self.is_done() {
                break Ok(());
            }
            match self.run_once() {
                Ok(true) => idle = 0,
                Ok(false) => {
                    idle += 1;
                    self.idle_iterations += 1;
                    if idle >= self.max_idle_iterations {
                        break Err(ExecError::Stalled(idle));
                    }
                    idle_backoff(idle);
                }
                Err(e) => break Err(e),
            }
        };
        self.close();

        match outcome {
            Ok(()) => {
                let stats = DriverStats {
                    driver_id: self.id,
                    iterations: self.iterations,
                    idle_iterations: self.idle_iterations,
                    elapsed_micros: started.elapsed().as_micros() as u64,
                    operators: self.retired.clone(),
                };
                emit_stats(&stats);
                Ok(stats)
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(driver = %self.id, error = %e, "driver failed");
                Err(e)
            }
        }
    }

    /// Close every operator still running. Idempotent.
    pub fn close(&mut self) {
        for mut slot in self.active.drain(..) {
            slot.op.close();
            self.retired.push(slot.stats);
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_core::error::{Error, Result};
    use pageflow_data::{BlockFactory, Page};
    use pageflow_operators::{
        CollectedPages, LimitOperator, LongDoubleTupleSourceOperator, Operator,
        PageCollectorSink,
    };

    fn source(factory: &BlockFactory, rows: i64, page_size: usize) -> BoxedOperator {
        LongDoubleTupleSourceOperator::with_max_page_positions(
            factory.clone(),
            (0..rows).map(|i| (Some(i), Some(i as f64))),
            page_size,
        )
        .unwrap()
        .boxed()
    }

    /// Accepts input but never finishes and never emits.
    struct BlackHole;

    impl Operator for BlackHole {
        fn name(&self) -> &'static str {
            "black_hole"
        }
        fn needs_input(&self) -> bool {
            false
        }
        fn add_input(&mut self, _page: Page) -> Result<()> {
            Err(Error::illegal_state("full"))
        }
        fn finish(&mut self) {}
        fn is_finished(&self) -> bool {
            false
        }
        fn get_output(&mut self) -> Result<Option<Page>> {
            Ok(None)
        }
        fn close(&mut self) {}
    }

    #[test]
    fn drains_source_into_sink() {
        let factory = BlockFactory::with_limit(1 << 20);
        let pages = CollectedPages::new();
        let mut driver = Driver::new(
            DriverId::new(1),
            vec![
                source(&factory, 10, 4),
                PageCollectorSink::new(pages.clone()).boxed(),
            ],
        )
        .unwrap();
        let stats = driver.run().unwrap();
        assert!(driver.is_done());
        assert_eq!(pages.page_count(), 3);
        assert_eq!(stats.positions_delivered(), 10);
        assert_eq!(stats.operators[0].pages_out, 3);
        assert_eq!(stats.operators[0].name, "long_double_tuple_source");
        pages.clear();
        assert_eq!(factory.used_bytes(), 0);
    }

    #[test]
    fn limit_closes_the_source_early() {
        let factory = BlockFactory::with_limit(1 << 20);
        let pages = CollectedPages::new();
        let mut driver = Driver::new(
            DriverId::new(2),
            vec![
                source(&factory, 1000, 10),
                LimitOperator::new(factory.clone(), 15).boxed(),
                PageCollectorSink::new(pages.clone()).boxed(),
            ],
        )
        .unwrap();
        let stats = driver.run().unwrap();
        assert_eq!(pages.position_count(), 15);
        assert_eq!(stats.operators[0].pages_out, 2);
    }

    #[test]
    fn cancelled_driver_closes_everything() {
        let factory = BlockFactory::with_limit(1 << 20);
        let mut driver = Driver::new(
            DriverId::new(3),
            vec![
                source(&factory, 100, 10),
                PageCollectorSink::new(CollectedPages::new()).boxed(),
            ],
        )
        .unwrap();
        driver.cancel_handle().cancel();
        assert!(matches!(driver.run(), Err(ExecError::Cancelled)));
        assert!(driver.is_done());
        driver.close();
    }

    #[test]
    fn stalled_chain_is_reported() {
        let factory = BlockFactory::unlimited();
        let mut driver = Driver::new(DriverId::new(4), vec![source(&factory, 5, 1), BlackHole.boxed()])
            .unwrap()
            .with_max_idle_iterations(3);
        assert!(matches!(driver.run(), Err(ExecError::Stalled(3))));
    }

    /// Reports "no output yet" until a deadline, then emits one page.
    struct Delayed {
        ready_at: Instant,
        done: bool,
    }

    impl Operator for Delayed {
        fn name(&self) -> &'static str {
            "delayed"
        }
        fn needs_input(&self) -> bool {
            false
        }
        fn add_input(&mut self, _page: Page) -> Result<()> {
            Err(Error::illegal_state("source"))
        }
        fn finish(&mut self) {}
        fn is_finished(&self) -> bool {
            self.done
        }
        fn get_output(&mut self) -> Result<Option<Page>> {
            if Instant::now() < self.ready_at {
                return Ok(None);
            }
            self.done = true;
            Ok(Some(Page::with_position_count(1)))
        }
        fn close(&mut self) {}
    }

    #[test]
    fn idle_passes_back_off_instead_of_spinning_into_a_stall() {
        let pages = CollectedPages::new();
        let delayed = Delayed {
            ready_at: Instant::now() + Duration::from_millis(30),
            done: false,
        };
        // 200 bare yields take far less than 30ms; parked passes do not
        let mut driver = Driver::new(
            DriverId::new(6),
            vec![delayed.boxed(), PageCollectorSink::new(pages.clone()).boxed()],
        )
        .unwrap()
        .with_max_idle_iterations(200);
        let stats = driver.run().unwrap();
        assert_eq!(pages.position_count(), 1);
        assert!(stats.idle_iterations > SPIN_IDLE_PASSES as u64);
    }

    #[test]
    fn single_operator_chain_is_invalid() {
        let factory = BlockFactory::unlimited();
        let err = Driver::new(DriverId::new(5), vec![source(&factory, 1, 1)])
            .err()
            .unwrap();
        assert!(matches!(err, ExecError::Invalid(_)));
    }
}
