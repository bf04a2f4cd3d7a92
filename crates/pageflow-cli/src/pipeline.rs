//! Synthetic long/double pipelines assembled from command-line flags.

use std::ops::Range;

use serde::Serialize;

use pageflow_core::config::EngineConfig;
use pageflow_core::schema::{Field, Schema};
use pageflow_core::types::{ElementType, Value};
use pageflow_exec::{DriverStats, Engine, ExecError};
use pageflow_operators::{
    AggregateOperator, Aggregation, BoxedOperator, CollectedPages, FilterOperator,
    LimitOperator, LongDoubleTupleSourceOperator, Operator, PageCollectorSink, Predicate,
};

/// Channel 0 `l` (long), channel 1 `d` (double).
pub fn schema() -> Schema {
    Schema::new(vec![
        Field::new("l", ElementType::Long, true),
        Field::new("d", ElementType::Double, true),
    ])
}

/// Row `i` is `(i, i / 2)`; with `null_every = k > 0`, every k-th long is
/// null and every k-th double after that.
pub fn synthetic_rows(
    range: Range<usize>,
    null_every: usize,
) -> impl Iterator<Item = (Option<i64>, Option<f64>)> {
    range.map(move |i| {
        let nth = |offset: usize| null_every > 0 && (i + offset) % null_every == 0;
        let l = (!nth(1)).then_some(i as i64);
        let d = (!nth(0)).then_some(i as f64 / 2.0);
        (l, d)
    })
}

#[derive(Debug, Clone, Default)]
pub struct SyntheticPipeline {
    pub rows: usize,
    pub null_every: usize,
    pub filter: Option<String>,
    pub limit: Option<usize>,
    pub aggregates: Vec<String>,
    /// Pipeline instances; rows are split evenly between them.
    pub parallel: usize,
}

#[derive(Debug, Serialize)]
pub struct AggregateValue {
    pub expr: String,
    pub value: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub config: EngineConfig,
    pub rows_in: usize,
    pub rows_out: usize,
    pub pages_out: usize,
    pub limit_bytes: usize,
    pub peak_bytes: usize,
    pub used_bytes_after: usize,
    /// One row of results per pipeline instance.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aggregates: Vec<Vec<AggregateValue>>,
    pub drivers: Vec<DriverStats>,
}

impl SyntheticPipeline {
    fn chain(
        &self,
        engine: &Engine,
        range: Range<usize>,
        out: &CollectedPages,
    ) -> Result<Vec<BoxedOperator>, ExecError> {
        let factory = engine.factory();
        let schema = schema();
        let mut ops = vec![LongDoubleTupleSourceOperator::with_max_page_positions(
            factory.clone(),
            synthetic_rows(range, self.null_every),
            engine.config().max_page_positions,
        )?
        .boxed()];

        if let Some(expr) = &self.filter {
            let predicate = Predicate::parse(expr, &schema)?;
            ops.push(FilterOperator::new(factory.clone(), predicate).boxed());
        }
        if let Some(limit) = self.limit {
            ops.push(LimitOperator::new(factory.clone(), limit).boxed());
        }
        if !self.aggregates.is_empty() {
            let aggregations = self
                .aggregates
                .iter()
                .map(|a| Aggregation::parse(a, &schema))
                .collect::<pageflow_core::Result<Vec<_>>>()?;
            ops.push(
                AggregateOperator::new(factory.clone(), aggregations, &schema.element_types())?
                    .boxed(),
            );
        }
        ops.push(PageCollectorSink::new(out.clone()).boxed());
        Ok(ops)
    }

    pub fn run(&self, engine: &Engine) -> Result<RunReport, ExecError> {
        let instances = self.parallel.max(1);
        let chunk = self.rows.div_ceil(instances).max(1);
        let outputs: Vec<CollectedPages> = (0..instances).map(|_| CollectedPages::new()).collect();

        let drivers = outputs
            .iter()
            .enumerate()
            .map(|(i, out)| {
                let start = (i * chunk).min(self.rows);
                let end = ((i + 1) * chunk).min(self.rows);
                engine.driver(self.chain(engine, start..end, out)?)
            })
            .collect::<Result<Vec<_>, ExecError>>()?;

        tracing::info!(
            rows = self.rows,
            instances,
            filter = self.filter.as_deref().unwrap_or(""),
            "running synthetic pipeline"
        );
        let drivers = if instances == 1 {
            let mut drivers = drivers;
            let mut stats = Vec::with_capacity(1);
            for driver in drivers.iter_mut() {
                stats.push(driver.run()?);
            }
            stats
        } else {
            engine.run_parallel(drivers)?
        };

        let mut rows_out = 0;
        let mut pages_out = 0;
        let mut aggregates = Vec::new();
        for out in &outputs {
            let pages = out.take();
            pages_out += pages.len();
            rows_out += pages.iter().map(|p| p.position_count()).sum::<usize>();
            if !self.aggregates.is_empty() {
                if let Some(page) = pages.first() {
                    aggregates.push(
                        self.aggregates
                            .iter()
                            .enumerate()
                            .map(|(c, expr)| AggregateValue {
                                expr: expr.clone(),
                                value: page.get_value(c, 0),
                            })
                            .collect(),
                    );
                }
            }
        }

        let factory = engine.factory();
        Ok(RunReport {
            config: engine.config().clone(),
            rows_in: self.rows,
            rows_out,
            pages_out,
            limit_bytes: factory.limit_bytes(),
            peak_bytes: factory.peak_bytes(),
            used_bytes_after: factory.used_bytes(),
            aggregates,
            drivers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(max_page_positions: usize) -> Engine {
        Engine::new(EngineConfig {
            max_page_positions,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn synthetic_rows_insert_nulls() {
        let rows: Vec<_> = synthetic_rows(0..4, 2).collect();
        assert_eq!(
            rows,
            vec![
                (Some(0), None),
                (None, Some(0.5)),
                (Some(2), None),
                (None, Some(1.5)),
            ]
        );
        assert!(synthetic_rows(0..10, 0).all(|(l, d)| l.is_some() && d.is_some()));
    }

    #[test]
    fn filter_limit_pipeline_reports_rows_and_returns_memory() {
        let pipeline = SyntheticPipeline {
            rows: 1000,
            filter: Some("l >= 100".into()),
            limit: Some(250),
            ..SyntheticPipeline::default()
        };
        let report = pipeline.run(&engine(64)).unwrap();
        assert_eq!(report.rows_out, 250);
        assert_eq!(report.used_bytes_after, 0);
        assert!(report.peak_bytes > 0);
        assert_eq!(report.drivers.len(), 1);
    }

    #[test]
    fn parallel_aggregates_report_one_row_per_instance() {
        let pipeline = SyntheticPipeline {
            rows: 100,
            aggregates: vec!["count(*)".into(), "sum(l)".into()],
            parallel: 2,
            ..SyntheticPipeline::default()
        };
        let report = pipeline.run(&engine(16)).unwrap();
        assert_eq!(report.aggregates.len(), 2);
        let total: i64 = report
            .aggregates
            .iter()
            .map(|row| match &row[1].value {
                Some(Value::Long(v)) => *v,
                other => panic!("unexpected sum {other:?}"),
            })
            .sum();
        assert_eq!(total, (0..100).sum::<i64>());
        assert_eq!(report.aggregates[0][0].value, Some(Value::Long(50)));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rows_in"], 100);
    }

    #[test]
    fn bad_filter_is_a_config_error() {
        let pipeline = SyntheticPipeline {
            rows: 10,
            filter: Some("zzz > 1".into()),
            ..SyntheticPipeline::default()
        };
        let err = pipeline.run(&engine(8)).unwrap_err();
        assert!(matches!(
            err,
            ExecError::Compute(pageflow_core::Error::Config(_))
        ));
    }

    #[test]
    fn tiny_memory_cap_fails_and_leaks_nothing() {
        let engine = Engine::new(EngineConfig {
            mem_cap_bytes: 100,
            ..EngineConfig::default()
        })
        .unwrap();
        let pipeline = SyntheticPipeline {
            rows: 10,
            ..SyntheticPipeline::default()
        };
        let err = pipeline.run(&engine).unwrap_err();
        assert!(err.is_memory_limit());
        assert_eq!(engine.factory().used_bytes(), 0);
    }
}
