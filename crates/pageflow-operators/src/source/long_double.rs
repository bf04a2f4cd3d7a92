use pageflow_core::error::Result;
use pageflow_data::{BlockFactory, Page};

use super::{row_at, BlockSourceOperator, SourceRows};

/// `(long, double)` pairs; either component may be null.
#[derive(Debug, Clone, Default)]
pub struct LongDoubleTuples {
    values: Vec<(Option<i64>, Option<f64>)>,
}

impl LongDoubleTuples {
    pub fn new(values: Vec<(Option<i64>, Option<f64>)>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[(Option<i64>, Option<f64>)] {
        &self.values
    }
}

impl FromIterator<(Option<i64>, Option<f64>)> for LongDoubleTuples {
    fn from_iter<I: IntoIterator<Item = (Option<i64>, Option<f64>)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl SourceRows for LongDoubleTuples {
    fn name(&self) -> &'static str {
        "long_double_tuple_source"
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn create_page(&self, factory: &BlockFactory, offset: usize, length: usize) -> Result<Page> {
        let mut longs = factory.new_long_block_builder(length)?;
        let mut doubles = factory.new_double_block_builder(length)?;
        for i in 0..length {
            let (l, d) = row_at(&self.values, offset + i)?;
            match l {
                Some(v) => longs.append(*v)?,
                None => longs.append_null()?,
            };
            match d {
                Some(v) => doubles.append(*v)?,
                None => doubles.append_null()?,
            };
        }
        Page::new(vec![longs.build()?.into(), doubles.build()?.into()])
    }
}

/// Two-column source: channel 0 is `Long`, channel 1 is `Double`.
pub type LongDoubleTupleSourceOperator = BlockSourceOperator<LongDoubleTuples>;

impl BlockSourceOperator<LongDoubleTuples> {
    /// Pages of at most `DEFAULT_MAX_PAGE_POSITIONS` rows.
    pub fn new(
        factory: BlockFactory,
        values: impl IntoIterator<Item = (Option<i64>, Option<f64>)>,
    ) -> Self {
        Self::with_default_page_size(factory, values.into_iter().collect())
    }

    pub fn with_max_page_positions(
        factory: BlockFactory,
        values: impl IntoIterator<Item = (Option<i64>, Option<f64>)>,
        max_page_positions: usize,
    ) -> Result<Self> {
        Self::from_rows(factory, values.into_iter().collect(), max_page_positions)
    }
}
