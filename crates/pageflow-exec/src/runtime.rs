//! Runtime: owns the configuration and the shared block factory, hands out
//! drivers and runs them, sequentially or on scoped worker threads.
//!
//! - One `BlockFactory` (and therefore one breaker) per engine; every driver
//!   the engine creates charges against it.
//! - `run_parallel` runs at most `max_parallel_pipelines` drivers at once. A
//!   failing driver cancels the others.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use pageflow_core::config::EngineConfig;
use pageflow_core::id::IdGenerator;
use pageflow_data::BlockFactory;
use pageflow_operators::BoxedOperator;

use crate::driver::{CancelHandle, Driver};
use crate::metrics::DriverStats;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Compute(#[from] pageflow_core::Error),
    #[error("pipeline cancelled")]
    Cancelled,
    #[error("invalid pipeline: {0}")]
    Invalid(String),
    #[error("driver made no progress for {0} iterations")]
    Stalled(usize),
    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),
}

impl ExecError {
    /// Did a breaker refuse a reservation somewhere in the pipeline?
    pub fn is_memory_limit(&self) -> bool {
        matches!(self, ExecError::Compute(e) if e.is_memory_limit())
    }
}

pub struct Engine {
    cfg: EngineConfig,
    factory: BlockFactory,
    ids: IdGenerator,
}

impl Engine {
    /// Engine with a fresh breaker capped at `cfg.mem_cap_bytes`.
    pub fn new(cfg: EngineConfig) -> Result<Self, ExecError> {
        let factory = BlockFactory::from_config(&cfg);
        Self::with_factory(cfg, factory)
    }

    /// Engine charging against an existing factory.
    pub fn with_factory(cfg: EngineConfig, factory: BlockFactory) -> Result<Self, ExecError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            factory,
            ids: IdGenerator::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn factory(&self) -> &BlockFactory {
        &self.factory
    }

    /// Wrap a chain in a driver configured from this engine.
    pub fn driver(&self, operators: Vec<BoxedOperator>) -> Result<Driver, ExecError> {
        Ok(Driver::new(self.ids.next_driver(), operators)?
            .with_max_idle_iterations(self.cfg.driver_max_idle_iterations))
    }

    /// Build and run one chain on the calling thread.
    pub fn run(&self, operators: Vec<BoxedOperator>) -> Result<DriverStats, ExecError> {
        let mut driver = self.driver(operators)?;
        driver.run()
    }

    /// Run several drivers concurrently on scoped threads sharing this
    /// engine's factory. Stats are returned in input order.
    ///
    /// Every driver is run or closed before this returns. The first failure
    /// cancels the drivers still running; the error reported is the first
    /// one that is not a consequence of that cancellation.
    pub fn run_parallel(&self, drivers: Vec<Driver>) -> Result<Vec<DriverStats>, ExecError> {
        let total = drivers.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let handles: Vec<CancelHandle> = drivers.iter().map(Driver::cancel_handle).collect();
        let queue: Mutex<VecDeque<(usize, Driver)>> =
            Mutex::new(drivers.into_iter().enumerate().collect());
        let results: Mutex<Vec<Option<Result<DriverStats, ExecError>>>> =
            Mutex::new((0..total).map(|_| None).collect());
        let workers = self.cfg.max_parallel_pipelines.min(total);

        #[cfg(feature = "tracing")]
        tracing::debug!(drivers = total, workers, "running pipelines in parallel");

        let (queue, results_ref, handles) = (&queue, &results, &handles);
        let panics: Vec<String> = std::thread::scope(|scope| {
            let spawned: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || loop {
                        let Some((index, mut driver)) = lock(queue).pop_front() else {
                            break;
                        };
                        let result = driver.run();
                        if matches!(&result, Err(e) if !matches!(e, ExecError::Cancelled)) {
                            handles.iter().for_each(CancelHandle::cancel);
                        }
                        lock(results_ref)[index] = Some(result);
                    })
                })
                .collect();
            spawned
                .into_iter()
                .filter_map(|h| h.join().err())
                .map(|payload| panic_message(payload.as_ref()))
                .collect()
        });

        if let Some(msg) = panics.into_iter().next() {
            return Err(ExecError::WorkerPanicked(msg));
        }

        let results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut stats = Vec::with_capacity(total);
        let mut cancelled = false;
        let mut failure = None;
        for result in results {
            match result {
                Some(Ok(s)) => stats.push(s),
                Some(Err(ExecError::Cancelled)) | None => cancelled = true,
                Some(Err(e)) => {
                    failure.get_or_insert(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None if cancelled => Err(ExecError::Cancelled),
            None => Ok(stats),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_core::error::Error;
    use pageflow_operators::{
        CollectedPages, LongDoubleTupleSourceOperator, Operator, PageCollectorSink,
    };

    fn chain(engine: &Engine, rows: i64, pages: &CollectedPages) -> Vec<BoxedOperator> {
        vec![
            LongDoubleTupleSourceOperator::with_max_page_positions(
                engine.factory().clone(),
                (0..rows).map(|i| (Some(i), None)),
                engine.config().max_page_positions,
            )
            .unwrap()
            .boxed(),
            PageCollectorSink::new(pages.clone()).boxed(),
        ]
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = EngineConfig {
            max_parallel_pipelines: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            Engine::new(cfg),
            Err(ExecError::Compute(Error::Config(_)))
        ));
    }

    #[test]
    fn drivers_get_distinct_ids() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let pages = CollectedPages::new();
        let a = engine.driver(chain(&engine, 1, &pages)).unwrap();
        let b = engine.driver(chain(&engine, 1, &pages)).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn parallel_run_returns_stats_in_order() {
        let cfg = EngineConfig {
            max_page_positions: 7,
            max_parallel_pipelines: 2,
            ..EngineConfig::default()
        };
        let engine = Engine::new(cfg).unwrap();
        let outputs: Vec<CollectedPages> = (0..5).map(|_| CollectedPages::new()).collect();
        let drivers = outputs
            .iter()
            .enumerate()
            .map(|(i, out)| engine.driver(chain(&engine, 10 * (i as i64 + 1), out)).unwrap())
            .collect();

        let stats = engine.run_parallel(drivers).unwrap();
        assert_eq!(stats.len(), 5);
        for (i, s) in stats.iter().enumerate() {
            assert_eq!(s.positions_delivered(), 10 * (i as u64 + 1));
            assert_eq!(outputs[i].position_count(), 10 * (i + 1));
        }
        outputs.iter().for_each(CollectedPages::clear);
        assert_eq!(engine.factory().used_bytes(), 0);
    }

    #[test]
    fn stats_serialize_to_json() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let pages = CollectedPages::new();
        let stats = engine.run(chain(&engine, 3, &pages)).unwrap();
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["operators"][0]["positions_out"], 3);
        assert_eq!(json["operators"][1]["name"], "page_collector");
    }
}
