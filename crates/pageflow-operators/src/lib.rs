#![forbid(unsafe_code)]
//! pageflow-operators: the pull-based operator surface.
//!
//! Families:
//! - Sources: `LongDoubleTupleSourceOperator`, `TupleSourceOperator`
//! - Intermediates: `FilterOperator`, `ProjectOperator`, `LimitOperator`,
//!   `AggregateOperator`
//! - Sinks: `PageCollectorSink`, `PageConsumerSink`

pub mod aggregate;
pub mod filter;
pub mod limit;
pub mod project;
pub mod sink;
pub mod source;
pub mod traits;

pub use aggregate::{AggregateOperator, Aggregation};
pub use filter::{CompareOp, FilterOperator, Predicate};
pub use limit::LimitOperator;
pub use project::ProjectOperator;
pub use sink::{CollectedPages, PageCollectorSink, PageConsumerSink};
pub use source::{
    BlockSourceOperator, LongDoubleTupleSourceOperator, LongDoubleTuples, SourceRows,
    SourceStatus, TupleRows, TupleSourceOperator,
};
pub use traits::{Operator, OperatorState};

/// Boxed operator as stored in a driver's chain.
pub type BoxedOperator = Box<dyn Operator>;
