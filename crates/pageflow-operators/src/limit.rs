use pageflow_core::error::Result;
use pageflow_data::{BlockFactory, Page};

use crate::traits::{Operator, Pipe};

/// Passes through the first `limit` positions, then finishes. A finished
/// limit lets the driver close everything upstream of it.
pub struct LimitOperator {
    factory: BlockFactory,
    limit: usize,
    remaining: usize,
    pipe: Pipe,
}

impl LimitOperator {
    pub fn new(factory: BlockFactory, limit: usize) -> Self {
        let mut pipe = Pipe::new("limit");
        if limit == 0 {
            pipe.finish();
        }
        Self {
            factory,
            limit,
            remaining: limit,
            pipe,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl Operator for LimitOperator {
    fn name(&self) -> &'static str {
        "limit"
    }

    fn needs_input(&self) -> bool {
        self.remaining > 0 && self.pipe.needs_input()
    }

    fn add_input(&mut self, page: Page) -> Result<()> {
        self.pipe.check_accepting()?;
        let n = page.position_count();
        let out = if n <= self.remaining {
            page
        } else {
            let positions: Vec<usize> = (0..self.remaining).collect();
            page.filter(&self.factory, &positions)?
        };
        self.remaining -= out.position_count();
        self.pipe.push_output(out);
        if self.remaining == 0 {
            tracing::debug!(limit = self.limit, "limit reached");
            self.pipe.finish();
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.pipe.finish();
    }

    fn is_finished(&self) -> bool {
        self.pipe.is_finished()
    }

    fn get_output(&mut self) -> Result<Option<Page>> {
        self.pipe.take_output()
    }

    fn close(&mut self) {
        self.pipe.close();
    }
}
