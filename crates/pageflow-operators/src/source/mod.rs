//! Bounded sources: operators that slice an in-memory tuple collection into
//! pages of at most `max_page_positions` rows.
//!
//! `BlockSourceOperator` owns the cursor and the lifecycle; a `SourceRows`
//! implementation only knows how to turn a contiguous row range into one page.

mod long_double;
mod tuples;

pub use long_double::{LongDoubleTupleSourceOperator, LongDoubleTuples};
pub use tuples::{TupleRows, TupleSourceOperator};

use pageflow_core::config::DEFAULT_MAX_PAGE_POSITIONS;
use pageflow_core::error::{Error, Result};
use pageflow_data::{BlockFactory, Page};
use serde::Serialize;

use crate::traits::Operator;

/// A finite, random-access row collection a source can page through.
pub trait SourceRows: Send {
    fn name(&self) -> &'static str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build one page from rows `offset .. offset + length`, one block per
    /// column in declared order. Reading past the last row is
    /// `IndexOutOfRange`.
    fn create_page(&self, factory: &BlockFactory, offset: usize, length: usize) -> Result<Page>;
}

/// Progress counters of a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub pages_emitted: u64,
    pub rows_emitted: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Producing,
    Finished,
    Closed,
}

pub struct BlockSourceOperator<R> {
    factory: BlockFactory,
    rows: R,
    max_page_positions: usize,
    current_position: usize,
    state: SourceState,
    status: SourceStatus,
}

impl<R: SourceRows> BlockSourceOperator<R> {
    /// A `max_page_positions` of zero is rejected with `Error::Config`.
    pub fn from_rows(factory: BlockFactory, rows: R, max_page_positions: usize) -> Result<Self> {
        if max_page_positions == 0 {
            return Err(Error::Config(
                "max_page_positions must be greater than zero".into(),
            ));
        }
        Ok(Self {
            factory,
            rows,
            max_page_positions,
            current_position: 0,
            state: SourceState::Producing,
            status: SourceStatus::default(),
        })
    }

    pub(crate) fn with_default_page_size(factory: BlockFactory, rows: R) -> Self {
        Self {
            factory,
            rows,
            max_page_positions: DEFAULT_MAX_PAGE_POSITIONS,
            current_position: 0,
            state: SourceState::Producing,
            status: SourceStatus::default(),
        }
    }

    /// Rows not yet emitted.
    pub fn remaining(&self) -> usize {
        self.rows.len().saturating_sub(self.current_position)
    }

    pub fn current_position(&self) -> usize {
        self.current_position
    }

    pub fn max_page_positions(&self) -> usize {
        self.max_page_positions
    }

    pub fn status(&self) -> SourceStatus {
        self.status
    }

    pub fn rows(&self) -> &R {
        &self.rows
    }
}

impl<R: SourceRows> Operator for BlockSourceOperator<R> {
    fn name(&self) -> &'static str {
        self.rows.name()
    }

    fn needs_input(&self) -> bool {
        false
    }

    fn add_input(&mut self, _page: Page) -> Result<()> {
        Err(Error::IllegalState(format!(
            "{} is a source and takes no input",
            self.rows.name()
        )))
    }

    fn finish(&mut self) {
        if self.state == SourceState::Producing {
            self.state = SourceState::Finished;
        }
    }

    fn is_finished(&self) -> bool {
        self.state != SourceState::Producing || self.remaining() == 0
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        if self.is_finished() {
            return Err(Error::IllegalState(format!(
                "get_output called on finished {}",
                self.rows.name()
            )));
        }
        let length = self.max_page_positions.min(self.remaining());
        let page = self
            .rows
            .create_page(&self.factory, self.current_position, length)?;
        self.current_position += length;
        self.status.pages_emitted += 1;
        self.status.rows_emitted += length as u64;

        tracing::trace!(
            source = self.rows.name(),
            positions = length,
            remaining = self.remaining(),
            bytes = page.ram_bytes_used(),
            "emitted page"
        );
        Ok(Some(page))
    }

    fn close(&mut self) {
        if self.state != SourceState::Closed {
            tracing::debug!(
                source = self.rows.name(),
                pages = self.status.pages_emitted,
                rows = self.status.rows_emitted,
                "source closed"
            );
            self.state = SourceState::Closed;
        }
    }
}

/// Row `index` of `rows`, or `IndexOutOfRange`.
pub(crate) fn row_at<T>(rows: &[T], index: usize) -> Result<&T> {
    rows.get(index).ok_or(Error::IndexOutOfRange {
        index,
        len: rows.len(),
    })
}
