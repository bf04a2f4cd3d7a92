//! Ungrouped aggregation: consumes every input page, emits one row at the end.
//!
//! `count` counts positions (nulls included). `sum`, `avg`, `min` and `max`
//! skip nulls, fold every value of a multi-valued position, and yield null
//! when they saw no value. A long `sum` that overflows yields null.

use std::cmp::Ordering;
use std::fmt;

use pageflow_core::error::{Error, Result};
use pageflow_core::schema::Schema;
use pageflow_core::types::{ElementType, Value};
use pageflow_data::{Block, BlockFactory, Page};
use serde::{Deserialize, Serialize};

use crate::traits::Operator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "fn", content = "channel")]
pub enum Aggregation {
    Count,
    Sum(usize),
    Avg(usize),
    Min(usize),
    Max(usize),
}

impl Aggregation {
    /// Parse `count(*)`, `sum(score)`, `max(id)`... against `schema`.
    pub fn parse(expr: &str, schema: &Schema) -> Result<Self> {
        let bad = || Error::Config(format!("unparseable aggregation: {expr}"));
        let expr = expr.trim();
        let open = expr.find('(').ok_or_else(bad)?;
        let arg = expr[open + 1..].strip_suffix(')').ok_or_else(bad)?.trim();
        let func = expr[..open].trim().to_ascii_lowercase();
        if func == "count" && (arg == "*" || arg.is_empty()) {
            return Ok(Aggregation::Count);
        }
        let channel = schema
            .index_of(arg)
            .ok_or_else(|| Error::Config(format!("field '{arg}' not found")))?;
        match func.as_str() {
            "count" => Ok(Aggregation::Count),
            "sum" => Ok(Aggregation::Sum(channel)),
            "avg" => Ok(Aggregation::Avg(channel)),
            "min" => Ok(Aggregation::Min(channel)),
            "max" => Ok(Aggregation::Max(channel)),
            _ => Err(bad()),
        }
    }

    pub fn channel(self) -> Option<usize> {
        match self {
            Aggregation::Count => None,
            Aggregation::Sum(c) | Aggregation::Avg(c) | Aggregation::Min(c) | Aggregation::Max(c) => {
                Some(c)
            }
        }
    }

    /// Output type given the input column types; `TypeMismatch` when the
    /// function does not apply to its column.
    pub fn output_type(self, input_types: &[ElementType]) -> Result<ElementType> {
        let input = match self.channel() {
            None => return Ok(ElementType::Long),
            Some(c) => *input_types.get(c).ok_or(Error::IndexOutOfRange {
                index: c,
                len: input_types.len(),
            })?,
        };
        let numeric = |out: ElementType| match input {
            ElementType::Int | ElementType::Long | ElementType::Double => Ok(out),
            other => Err(Error::TypeMismatch {
                expected: ElementType::Double,
                actual: other,
            }),
        };
        match self {
            Aggregation::Count => Ok(ElementType::Long),
            Aggregation::Sum(_) if input == ElementType::Double => Ok(ElementType::Double),
            Aggregation::Sum(_) => numeric(ElementType::Long),
            Aggregation::Avg(_) => numeric(ElementType::Double),
            Aggregation::Min(_) | Aggregation::Max(_) => Ok(input),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Count => write!(f, "count(*)"),
            Aggregation::Sum(c) => write!(f, "sum(${c})"),
            Aggregation::Avg(c) => write!(f, "avg(${c})"),
            Aggregation::Min(c) => write!(f, "min(${c})"),
            Aggregation::Max(c) => write!(f, "max(${c})"),
        }
    }
}

#[derive(Debug)]
enum Accumulator {
    Count(u64),
    SumLong { sum: i64, seen: bool, overflowed: bool },
    SumDouble { sum: f64, seen: bool },
    Avg { sum: f64, count: u64 },
    Extreme { best: Option<Value>, keep: Ordering },
}

impl Accumulator {
    fn new(aggregation: Aggregation, output_type: ElementType) -> Self {
        match aggregation {
            Aggregation::Count => Accumulator::Count(0),
            Aggregation::Sum(_) if output_type == ElementType::Double => Accumulator::SumDouble {
                sum: 0.0,
                seen: false,
            },
            Aggregation::Sum(_) => Accumulator::SumLong {
                sum: 0,
                seen: false,
                overflowed: false,
            },
            Aggregation::Avg(_) => Accumulator::Avg { sum: 0.0, count: 0 },
            Aggregation::Min(_) => Accumulator::Extreme {
                best: None,
                keep: Ordering::Less,
            },
            Aggregation::Max(_) => Accumulator::Extreme {
                best: None,
                keep: Ordering::Greater,
            },
        }
    }

    fn add(&mut self, block: Option<&Block>, positions: usize) -> Result<()> {
        if let Accumulator::Count(n) = self {
            *n += positions as u64;
            return Ok(());
        }
        let Some(block) = block else {
            return Ok(());
        };
        match self {
            Accumulator::Count(_) => {}
            Accumulator::SumLong {
                sum,
                seen,
                overflowed,
            } => {
                let mut fold = |v: i64| {
                    *seen = true;
                    match sum.checked_add(v) {
                        Some(s) => *sum = s,
                        None => *overflowed = true,
                    }
                };
                match block {
                    Block::Int(b) => b.values().iter().for_each(|&v| fold(i64::from(v))),
                    Block::Long(b) => b.values().iter().for_each(|&v| fold(v)),
                    other => return Err(mismatch(ElementType::Long, other)),
                }
            }
            Accumulator::SumDouble { sum, seen } => {
                let b = block
                    .as_double()
                    .ok_or_else(|| mismatch(ElementType::Double, block))?;
                *seen |= !b.values().is_empty();
                *sum += b.values().iter().sum::<f64>();
            }
            Accumulator::Avg { sum, count } => {
                let (s, n): (f64, usize) = match block {
                    Block::Int(b) => (
                        b.values().iter().map(|&v| f64::from(v)).sum(),
                        b.values().len(),
                    ),
                    Block::Long(b) => (b.values().iter().map(|&v| v as f64).sum(), b.values().len()),
                    Block::Double(b) => (b.values().iter().sum(), b.values().len()),
                    other => return Err(mismatch(ElementType::Double, other)),
                };
                *sum += s;
                *count += n as u64;
            }
            Accumulator::Extreme { best, keep } => {
                for p in 0..block.position_count() {
                    for v in block.get_values(p) {
                        let better = match best {
                            None => true,
                            Some(current) => v.compare(current)? == *keep,
                        };
                        if better {
                            *best = Some(v);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn result(&self) -> Option<Value> {
        match self {
            Accumulator::Count(n) => Some(Value::Long(*n as i64)),
            Accumulator::SumLong {
                overflowed: true, ..
            } => {
                tracing::warn!("long overflow in sum, result is null");
                None
            }
            Accumulator::SumLong { sum, seen, .. } => seen.then_some(Value::Long(*sum)),
            Accumulator::SumDouble { sum, seen } => seen.then_some(Value::Double(*sum)),
            Accumulator::Avg { sum, count } => {
                (*count > 0).then(|| Value::Double(*sum / *count as f64))
            }
            Accumulator::Extreme { best, .. } => best.clone(),
        }
    }
}

fn mismatch(expected: ElementType, block: &Block) -> Error {
    Error::TypeMismatch {
        expected,
        actual: block.element_type(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggState {
    Accumulating,
    /// Input is done; the result page is built on the next `get_output`.
    Finishing,
    Finished,
    Closed,
}

pub struct AggregateOperator {
    factory: BlockFactory,
    aggregations: Vec<Aggregation>,
    output_types: Vec<ElementType>,
    accumulators: Vec<Accumulator>,
    state: AggState,
}

impl AggregateOperator {
    /// `input_types` are the element types of the incoming channels.
    pub fn new(
        factory: BlockFactory,
        aggregations: Vec<Aggregation>,
        input_types: &[ElementType],
    ) -> Result<Self> {
        let output_types = aggregations
            .iter()
            .map(|a| a.output_type(input_types))
            .collect::<Result<Vec<_>>>()?;
        let accumulators = aggregations
            .iter()
            .zip(&output_types)
            .map(|(&a, &t)| Accumulator::new(a, t))
            .collect();
        Ok(Self {
            factory,
            aggregations,
            output_types,
            accumulators,
            state: AggState::Accumulating,
        })
    }

    pub fn output_types(&self) -> &[ElementType] {
        &self.output_types
    }

    fn build_output(&self) -> Result<Page> {
        let mut blocks = Vec::with_capacity(self.accumulators.len());
        for (acc, &t) in self.accumulators.iter().zip(&self.output_types) {
            let mut builder = self.factory.new_block_builder(t, 1)?;
            builder.append_option(acc.result())?;
            blocks.push(builder.build()?);
        }
        if blocks.is_empty() {
            return Ok(Page::with_position_count(1));
        }
        Page::new(blocks)
    }
}

impl Operator for AggregateOperator {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    fn needs_input(&self) -> bool {
        self.state == AggState::Accumulating
    }

    fn add_input(&mut self, page: Page) -> Result<()> {
        if self.state != AggState::Accumulating {
            return Err(Error::illegal_state(format!(
                "aggregate cannot accept input in state {:?}",
                self.state
            )));
        }
        for (acc, agg) in self.accumulators.iter_mut().zip(&self.aggregations) {
            let block = match agg.channel() {
                None => None,
                Some(c) => Some(page.block(c).ok_or(Error::IndexOutOfRange {
                    index: c,
                    len: page.block_count(),
                })?),
            };
            acc.add(block, page.position_count())?;
        }
        Ok(())
    }

    fn finish(&mut self) {
        if self.state == AggState::Accumulating {
            self.state = AggState::Finishing;
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, AggState::Finished | AggState::Closed)
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        match self.state {
            AggState::Accumulating => Ok(None),
            AggState::Finishing => {
                let page = self.build_output()?;
                self.state = AggState::Finished;
                tracing::debug!(
                    aggregations = self.aggregations.len(),
                    bytes = page.ram_bytes_used(),
                    "aggregate emitted result"
                );
                Ok(Some(page))
            }
            AggState::Finished | AggState::Closed => Err(Error::illegal_state(
                "get_output called on finished aggregate",
            )),
        }
    }

    fn close(&mut self) {
        self.state = AggState::Closed;
    }
}
